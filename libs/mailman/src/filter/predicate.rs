//! Field predicates
//!
//! A predicate pairs one [`Field`] of a [`Message`] with a regular
//! expression. Patterns are anchored at the start of the field value, so
//! `"ping"` matches `"ping"` and `"ping-2"` but not `"a-ping"`; add `$` to
//! require the whole value.

use crate::error::{MailmanError, Result};
use crate::message::Message;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Message field a predicate inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Sender,
    Recipient,
    Subject,
    Body,
    Time,
    /// A named entry of [`Message::headers`]
    Header(String),
}

impl Field {
    /// Text of this field on `message`, or `None` when the message lacks it
    pub fn value_of<'m>(&self, message: &'m Message) -> Option<Cow<'m, str>> {
        match self {
            Field::Sender => Some(Cow::Borrowed(message.sender.as_str())),
            Field::Recipient => Some(Cow::Borrowed(message.recipient.as_str())),
            Field::Subject => Some(Cow::Borrowed(message.subject.as_str())),
            Field::Body => match message.body.as_ref()? {
                Value::String(text) => Some(Cow::Borrowed(text.as_str())),
                other => Some(Cow::Owned(other.to_string())),
            },
            Field::Time => Some(Cow::Owned(message.time.to_rfc3339())),
            Field::Header(name) => message.header(name).map(Cow::Borrowed),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Sender => f.write_str("sender"),
            Field::Recipient => f.write_str("recipient"),
            Field::Subject => f.write_str("subject"),
            Field::Body => f.write_str("body"),
            Field::Time => f.write_str("time"),
            Field::Header(name) => write!(f, "header:{}", name),
        }
    }
}

/// One `field ~ pattern` test
#[derive(Debug, Clone)]
pub struct FieldPredicate {
    field: Field,
    pattern: String,
    regex: Regex,
}

impl FieldPredicate {
    pub fn new(field: Field, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
            MailmanError::InvalidPattern {
                field: field.to_string(),
                pattern: pattern.clone(),
                source,
            }
        })?;

        Ok(Self {
            field,
            pattern,
            regex,
        })
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Pattern as registered, without the anchoring
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// A missing field never matches
    pub fn matches(&self, message: &Message) -> bool {
        self.field
            .value_of(message)
            .map(|value| self.regex.is_match(&value))
            .unwrap_or(false)
    }
}

impl PartialEq for FieldPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.pattern == other.pattern
    }
}

/// AND over `predicates`
pub fn matches_all(predicates: &[FieldPredicate], message: &Message) -> bool {
    predicates.iter().all(|predicate| predicate.matches(message))
}
