//! Messenger
//!
//! Actor-facing API: `send`, `reply`, `wait_for_reply`, `request` and
//! `get_queue_message`. Sending only appends to the recipient's mailbox.
//! Waiting takes over the actor's own mailbox under its consumer lock, so
//! the dispatcher is locked out until the wait ends and the messages set
//! aside during it are back at the head of the queue.

use crate::config::CorrelationConfig;
use crate::correlation::PendingRequest;
use crate::error::{MailmanError, Result};
use crate::mailbox::{ConsumerView, Mailbox};
use crate::message::{next_thread_index, ActorId, Message, MessageDraft};
use crate::registry::PostOffice;
use crate::stats::MailmanStats;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How [`Messenger::wait_for_reply_with`] waits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Falls back to the configured default timeout
    pub timeout: Option<Duration>,
    /// Consume without the mailbox lock, racing the dispatcher
    pub ignore_lock: bool,
}

impl WaitOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ignore_lock: false,
        }
    }

    /// Skip the consumer lock
    ///
    /// The dispatcher may then take the reply, or any other message, first.
    /// Only for callers that already serialize consumption themselves.
    pub fn ignore_lock(mut self) -> Self {
        self.ignore_lock = true;
        self
    }
}

/// Messaging handle of one actor; cheap to clone into callbacks
#[derive(Debug, Clone)]
pub struct Messenger {
    actor: ActorId,
    default_route: String,
    mailbox: Arc<Mailbox>,
    post_office: PostOffice,
    correlation: CorrelationConfig,
    stats: Arc<MailmanStats>,
}

impl Messenger {
    /// Fails on an empty route or a zero poll interval or default timeout
    pub fn new(
        mailbox: Arc<Mailbox>,
        post_office: PostOffice,
        default_route: impl Into<String>,
        correlation: CorrelationConfig,
        stats: Arc<MailmanStats>,
    ) -> Result<Self> {
        let default_route = default_route.into();
        if default_route.is_empty() {
            return Err(MailmanError::config("default_route must not be empty"));
        }
        correlation.validate()?;

        Ok(Self {
            actor: mailbox.owner().clone(),
            default_route,
            mailbox,
            post_office,
            correlation,
            stats,
        })
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn post_office(&self) -> &PostOffice {
        &self.post_office
    }

    /// Start a new thread with `recipient`
    pub fn send(
        &self,
        recipient: impl Into<ActorId>,
        subject: impl Into<String>,
        body: impl Into<Value>,
    ) -> Result<Message> {
        self.send_draft(MessageDraft::new(recipient, subject).body(body))
    }

    /// Stamp and enqueue `draft`; returns the stamped message for correlation
    pub fn send_draft(&self, draft: MessageDraft) -> Result<Message> {
        let message = draft.stamp(&self.actor, &self.default_route);
        self.post_office.deliver(message.clone())?;
        self.stats.record_sent();

        debug!(
            actor = %self.actor,
            recipient = %message.recipient,
            subject = %message.subject,
            threadid = %message.threadid,
            threadindex = message.threadindex,
            "Message sent"
        );
        Ok(message)
    }

    /// Answer `original` with `body` under the default reply subject
    pub fn reply(&self, original: &Message, body: impl Into<Value>) -> Result<Message> {
        self.reply_with(original, |draft| draft.body(body))
    }

    /// Answer `original`, letting `customize` adjust subject, body or headers
    ///
    /// The thread id and the advanced thread index are enforced after
    /// `customize` runs.
    pub fn reply_with<F>(&self, original: &Message, customize: F) -> Result<Message>
    where
        F: FnOnce(MessageDraft) -> MessageDraft,
    {
        let mut draft = customize(MessageDraft::reply_to(original)?);
        draft.threadid = Some(original.threadid.clone());
        draft.threadindex = Some(next_thread_index(original)?);
        self.send_draft(draft)
    }

    /// Wait for the reply to `original`; `None` once `timeout` passes
    pub async fn wait_for_reply(&self, original: &Message, timeout: Duration) -> Option<Message> {
        self.wait_for_reply_with(original, WaitOptions::timeout(timeout))
            .await
    }

    pub async fn wait_for_reply_with(
        &self,
        original: &Message,
        options: WaitOptions,
    ) -> Option<Message> {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.correlation.default_timeout());
        let pending = PendingRequest::new(original.clone(), timeout);

        let mut view = if options.ignore_lock {
            self.mailbox.claim_unlocked()
        } else {
            match self.mailbox.claim_within(pending.remaining()).await {
                Some(view) => view,
                None => {
                    self.stats.record_wait(false, 0);
                    debug!(
                        actor = %self.actor,
                        threadid = %original.threadid,
                        "Timed out waiting for mailbox lock"
                    );
                    return None;
                }
            }
        };

        self.collect(pending, &mut view).await
    }

    /// Send a request and wait for its reply
    ///
    /// The mailbox lock is taken before sending, so a fast reply cannot be
    /// picked up by the dispatcher ahead of the wait.
    pub async fn request(
        &self,
        recipient: impl Into<ActorId>,
        subject: impl Into<String>,
        body: impl Into<Value>,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        self.request_draft(MessageDraft::new(recipient, subject).body(body), timeout)
            .await
    }

    pub async fn request_draft(
        &self,
        draft: MessageDraft,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        let deadline = Instant::now() + timeout;

        let Some(mut view) = self.mailbox.claim_within(timeout).await else {
            self.stats.record_wait(false, 0);
            debug!(actor = %self.actor, "Timed out waiting for mailbox lock");
            return Ok(None);
        };

        let original = self.send_draft(draft)?;
        let pending = PendingRequest::until(original, deadline);
        Ok(self.collect(pending, &mut view).await)
    }

    /// Take the next message from this actor's own mailbox
    pub async fn get_queue_message(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut view = self.mailbox.claim_within(timeout).await?;
        view.dequeue(deadline.saturating_duration_since(Instant::now()))
            .await
    }

    async fn collect(&self, pending: PendingRequest, view: &mut ConsumerView<'_>) -> Option<Message> {
        let threadid = pending.original().threadid.clone();
        let reply = pending
            .collect(view, self.correlation.poll_interval())
            .await;

        let buffered = view.held();
        self.stats.record_wait(reply.is_some(), buffered);

        match &reply {
            Some(message) => debug!(
                actor = %self.actor,
                threadid = %threadid,
                from = %message.sender,
                buffered,
                "Reply received"
            ),
            None => debug!(
                actor = %self.actor,
                threadid = %threadid,
                buffered,
                "Timed out waiting for reply"
            ),
        }

        reply
    }
}
