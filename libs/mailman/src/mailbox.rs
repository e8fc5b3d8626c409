//! Actor Mailbox
//!
//! Unbounded FIFO queue owned by one actor. Producers only ever append
//! through [`Mailbox::enqueue`]; consumption goes through a [`ConsumerView`]
//! obtained from [`Mailbox::claim`], which holds the mailbox's consumer lock
//! so the dispatcher and a waiting caller never dequeue at the same time.
//!
//! # Lock Ordering
//!
//! 1. `consumer` (async, held across awaits by the claiming task)
//! 2. `queue` (sync, never held across an await)

use crate::message::{ActorId, Message};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

/// FIFO message queue for one actor
#[derive(Debug)]
pub struct Mailbox {
    owner: ActorId,
    queue: Mutex<VecDeque<Message>>,
    /// Signalled on every enqueue/restore
    available: Notify,
    /// Decides who may dequeue right now; fair, so a waiter is served before
    /// the dispatcher re-acquires it
    consumer: AsyncMutex<()>,
}

impl Mailbox {
    pub fn new(owner: impl Into<ActorId>) -> Self {
        Self {
            owner: owner.into(),
            queue: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            consumer: AsyncMutex::new(()),
        }
    }

    /// Actor this mailbox belongs to
    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    /// Append to the tail; never blocks
    pub fn enqueue(&self, message: Message) {
        trace!(actor = %self.owner, messageid = %message.messageid, "Enqueued message");
        self.queue.lock().push_back(message);
        self.available.notify_one();
    }

    /// Remove the head message without waiting
    pub fn try_dequeue(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    /// Remove the head message, waiting up to `timeout` for one to arrive
    ///
    /// Returns `None` when the window closes with the queue still empty. This
    /// does not take the consumer lock; use a [`ConsumerView`] unless racing
    /// the dispatcher is intended.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(message) = self.try_dequeue() {
                return Some(message);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            if tokio::time::timeout(remaining, self.available.notified())
                .await
                .is_err()
            {
                return self.try_dequeue();
            }
        }
    }

    /// Remove and return every queued message, in order
    pub fn drain_all(&self) -> Vec<Message> {
        self.queue.lock().drain(..).collect()
    }

    /// Put `messages` back at the head, keeping their relative order
    pub fn restore(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }

        {
            let mut queue = self.queue.lock();
            for message in messages.into_iter().rev() {
                queue.push_front(message);
            }
        }
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Clone of the current queue contents, head first
    pub fn snapshot(&self) -> Vec<Message> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Take the consumer lock, waiting as long as needed
    pub async fn claim(&self) -> ConsumerView<'_> {
        let guard = self.consumer.lock().await;
        ConsumerView::new(self, Some(guard))
    }

    /// Take the consumer lock, giving up after `timeout`
    pub async fn claim_within(&self, timeout: Duration) -> Option<ConsumerView<'_>> {
        let guard = tokio::time::timeout(timeout, self.consumer.lock())
            .await
            .ok()?;
        Some(ConsumerView::new(self, Some(guard)))
    }

    /// View that consumes without the lock
    ///
    /// Whoever else is dequeuing (normally the dispatcher) races this view.
    /// Keeping that safe is the caller's responsibility.
    pub fn claim_unlocked(&self) -> ConsumerView<'_> {
        ConsumerView::new(self, None)
    }
}

/// Temporary, lock-scoped consumer of a [`Mailbox`]
///
/// Messages set aside with [`ConsumerView::hold`] go back to the head of the
/// mailbox when the view is dropped, ahead of whatever is still queued, on
/// every exit path.
#[derive(Debug)]
pub struct ConsumerView<'a> {
    mailbox: &'a Mailbox,
    held: Vec<Message>,
    // Released after `Drop::drop` has restored `held`.
    lock: Option<AsyncMutexGuard<'a, ()>>,
}

impl<'a> ConsumerView<'a> {
    fn new(mailbox: &'a Mailbox, lock: Option<AsyncMutexGuard<'a, ()>>) -> Self {
        Self {
            mailbox,
            held: Vec::new(),
            lock,
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        self.mailbox
    }

    /// Whether this view holds the consumer lock
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub async fn dequeue(&mut self, timeout: Duration) -> Option<Message> {
        self.mailbox.dequeue(timeout).await
    }

    /// Set a message aside for restoration
    pub fn hold(&mut self, message: Message) {
        self.held.push(message);
    }

    /// Number of messages set aside so far
    pub fn held(&self) -> usize {
        self.held.len()
    }
}

impl Drop for ConsumerView<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let mut pending = std::mem::take(&mut self.held);
        let buffered = pending.len();
        pending.extend(self.mailbox.drain_all());
        let restored = pending.len();
        self.mailbox.restore(pending);

        debug!(
            actor = %self.mailbox.owner,
            buffered,
            restored,
            "Restored buffered messages to mailbox"
        );
    }
}
