//! Mailman Error Types
//!
//! Configuration, filter-registration and routing failures. None of these
//! are raised out of the dispatch loop: filter setup errors are logged and
//! returned to the registering caller, and a reply timeout is not an error
//! at all (see [`crate::Messenger::wait_for_reply`]).

use crate::message::ActorId;
use thiserror::Error;

/// Main mailman error type
#[derive(Error, Debug)]
pub enum MailmanError {
    /// A filter was registered without any callback
    #[error("Filter has no callback")]
    MissingCallback,

    /// A filter id already exists in the target scope
    #[error("Duplicate filter id '{id}' in scope {scope}")]
    DuplicateFilterId { id: String, scope: String },

    /// Caller or route resolved to an empty value
    #[error("Filter scope could not be resolved: missing {field}")]
    UnresolvedScope { field: &'static str },

    /// A field predicate is not a valid regular expression
    #[error("Invalid pattern for field {field}: {pattern}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// No mailbox is registered for the recipient
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(ActorId),

    /// The message is at the last thread index and cannot be answered
    #[error("Thread {threadid} has no index left for a reply")]
    ThreadExhausted { threadid: String },

    /// An actor with this id already owns a mailbox
    #[error("Actor already registered: {0}")]
    DuplicateActor(ActorId),

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Configuration could not be loaded or deserialized
    #[error("Configuration source error: {0}")]
    Configuration(#[from] config::ConfigError),
}

/// Result type alias for mailman operations
pub type Result<T> = std::result::Result<T, MailmanError>;

impl MailmanError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
