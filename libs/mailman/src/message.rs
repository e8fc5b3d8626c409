//! Message Model
//!
//! [`MessageDraft`] is what callers build; [`Message`] is what travels. A
//! draft becomes a message only when the messenger stamps it with a
//! `messageid`, a `time` and, for a new conversation, a `threadid`. Replies
//! are built from the original as a fresh draft, so an enqueued message is
//! never mutated.

use crate::error::{MailmanError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Subject given to replies that do not set their own
pub const REPLY_SUBJECT: &str = "reply";

/// Addressable actor name
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ActorId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A stamped, enqueued message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: ActorId,
    pub recipient: ActorId,
    pub subject: String,
    /// Opaque payload
    pub body: Option<Value>,
    /// Creation time, set by the messenger on send
    pub time: DateTime<Utc>,
    pub messageid: String,
    /// Correlation group shared by a request and all of its replies
    pub threadid: String,
    /// Position within the thread; 0 for the initiating message
    pub threadindex: u64,
    /// Route the message arrived on, used to pick the filter scope
    pub route: String,
    pub headers: BTreeMap<String, String>,
}

impl Message {
    /// Look up a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Index a reply to `original` has to carry
pub(crate) fn next_thread_index(original: &Message) -> Result<u64> {
    original
        .threadindex
        .checked_add(1)
        .ok_or_else(|| MailmanError::ThreadExhausted {
            threadid: original.threadid.clone(),
        })
}

/// An unstamped message under construction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDraft {
    /// Defaults to the sending actor
    pub sender: Option<ActorId>,
    pub recipient: ActorId,
    pub subject: String,
    pub body: Option<Value>,
    /// Starts a new thread when absent
    pub threadid: Option<String>,
    pub threadindex: Option<u64>,
    /// Defaults to the sending actor's configured route
    pub route: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl MessageDraft {
    pub fn new(recipient: impl Into<ActorId>, subject: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Build the reply draft for `original`
    ///
    /// Sender and recipient are swapped, the thread is kept and the index
    /// advances by one. The route is kept so the reply lands in the scope the
    /// request came from. Fails when `original` already sits at the last
    /// thread index.
    pub fn reply_to(original: &Message) -> Result<Self> {
        let threadindex = next_thread_index(original)?;
        Ok(Self {
            sender: Some(original.recipient.clone()),
            recipient: original.sender.clone(),
            subject: REPLY_SUBJECT.to_string(),
            body: None,
            threadid: Some(original.threadid.clone()),
            threadindex: Some(threadindex),
            route: Some(original.route.clone()),
            headers: BTreeMap::new(),
        })
    }

    pub fn sender(mut self, sender: impl Into<ActorId>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn thread(mut self, threadid: impl Into<String>, threadindex: u64) -> Self {
        self.threadid = Some(threadid.into());
        self.threadindex = Some(threadindex);
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Stamp identity and time, filling defaults
    pub(crate) fn stamp(self, default_sender: &ActorId, default_route: &str) -> Message {
        let threadid = self
            .threadid
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        Message {
            sender: self.sender.unwrap_or_else(|| default_sender.clone()),
            recipient: self.recipient,
            subject: self.subject,
            body: self.body,
            time: Utc::now(),
            messageid: Uuid::new_v4().simple().to_string(),
            threadid,
            threadindex: self.threadindex.unwrap_or(0),
            route: self.route.unwrap_or_else(|| default_route.to_string()),
            headers: self.headers,
        }
    }
}
