//! Request/Reply Correlation
//!
//! A reply belongs to a request when it carries the request's `threadid`
//! and a `threadindex` exactly one past the request's. Anything else seen
//! while waiting, including later messages of the same thread, is unrelated
//! traffic: it is held aside and restored to the mailbox afterwards.

use crate::mailbox::ConsumerView;
use crate::message::Message;
use std::time::Duration;
use tokio::time::Instant;

/// Check whether `candidate` is the direct reply to `original`
///
/// An original at `u64::MAX` has no successor index and so no reply.
pub fn is_reply_to(candidate: &Message, original: &Message) -> bool {
    candidate.threadid == original.threadid
        && original.threadindex.checked_add(1) == Some(candidate.threadindex)
}

/// An in-flight wait for one reply
#[derive(Debug)]
pub struct PendingRequest {
    original: Message,
    deadline: Instant,
    reply: Option<Message>,
}

impl PendingRequest {
    pub fn new(original: Message, timeout: Duration) -> Self {
        Self::until(original, Instant::now() + timeout)
    }

    pub fn until(original: Message, deadline: Instant) -> Self {
        Self {
            original,
            deadline,
            reply: None,
        }
    }

    pub fn original(&self) -> &Message {
        &self.original
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_complete(&self) -> bool {
        self.reply.is_some()
    }

    /// Offer a dequeued message; hands it back when it is not the reply
    pub fn offer(&mut self, message: Message) -> Option<Message> {
        if self.reply.is_none() && is_reply_to(&message, &self.original) {
            self.reply = Some(message);
            None
        } else {
            Some(message)
        }
    }

    pub fn into_reply(self) -> Option<Message> {
        self.reply
    }

    /// Drain `view` until the reply shows up or the deadline passes
    ///
    /// Each dequeue attempt waits at most `poll_interval`; a zero interval
    /// waits for the whole remaining time instead. Unrelated messages are
    /// held on the view, which restores them when dropped.
    pub async fn collect(
        mut self,
        view: &mut ConsumerView<'_>,
        poll_interval: Duration,
    ) -> Option<Message> {
        while !self.is_complete() {
            let remaining = self.remaining();
            if remaining.is_zero() {
                break;
            }

            let window = if poll_interval.is_zero() {
                remaining
            } else {
                remaining.min(poll_interval)
            };
            let Some(message) = view.dequeue(window).await else {
                continue;
            };

            if let Some(unrelated) = self.offer(message) {
                view.hold(unrelated);
            }
        }

        self.into_reply()
    }
}
