//! Mailbox Messaging for In-Process Actors
//!
//! Every actor owns a FIFO mailbox registered with a shared [`PostOffice`].
//! A per-actor [`Dispatcher`] pulls messages off the mailbox and runs the
//! callbacks of the filters they match. The [`Messenger`] sends messages
//! and lets an actor block on the reply to one of its own requests while
//! the dispatcher keeps its hands off the mailbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  send / reply   ┌──────────────┐
//! │  Messenger   │────────────────▶│  PostOffice  │
//! │  (actor A)   │                 │ id → Mailbox │
//! └──────┬───────┘                 └──────┬───────┘
//!        │ wait_for_reply                 │ enqueue
//!        │ (consumer lock)                ▼
//!        │                         ┌──────────────┐
//!        └────────────────────────▶│  Mailbox A   │
//!                                  │  FIFO queue  │
//!                                  └──────┬───────┘
//!                                         │ dequeue (consumer lock)
//!                                         ▼
//!                                  ┌──────────────┐   match   ┌────────────────┐
//!                                  │ Dispatcher A │──────────▶│ FilterRegistry │
//!                                  └──────┬───────┘           └────────────────┘
//!                                         │ callbacks, in order
//!                                         ▼
//!                                  MessageHandler::handle
//! ```
//!
//! A mailbox has one consumer at a time. While an actor waits for a reply
//! its dispatcher is locked out; unrelated messages drained during the wait
//! go back to the head of the queue, in arrival order, before the lock is
//! released.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mailman::{handler_fn, ActorConfig, ActorContext, FilterSpec, Message, PostOffice};
//! use std::time::Duration;
//!
//! # async fn demo() -> mailman::Result<()> {
//! let post_office = PostOffice::new();
//! let a = ActorContext::open(&post_office, ActorConfig::new("a"))?;
//! let b = ActorContext::open(&post_office, ActorConfig::new("b"))?;
//!
//! let messenger = b.messenger().clone();
//! b.add_filter(
//!     FilterSpec::new()
//!         .subject("ping")
//!         .callback(handler_fn("pong", move |message: Message| {
//!             let messenger = messenger.clone();
//!             async move {
//!                 messenger.reply(&message, "pong")?;
//!                 Ok(())
//!             }
//!         })),
//! )?;
//! let dispatcher = b.spawn_dispatcher()?;
//!
//! let reply = a
//!     .messenger()
//!     .request("b", "ping", "ping", Duration::from_secs(1))
//!     .await?;
//! assert_eq!(reply.map(|m| m.subject), Some("reply".to_string()));
//!
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod mailbox;
pub mod message;
pub mod messenger;
pub mod registry;
pub mod stats;

pub use actor::ActorContext;
pub use crate::config::{ActorConfig, CorrelationConfig, DispatcherConfig, MailmanConfig, DEFAULT_ROUTE};
pub use correlation::{is_reply_to, PendingRequest};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherHandle, DispatcherState};
pub use error::{MailmanError, Result};
pub use filter::{
    handler_fn, Callback, Field, FieldPredicate, Filter, FilterMatch, FilterRegistry,
    FilterScope, FilterSpec, MessageHandler,
};
pub use mailbox::{ConsumerView, Mailbox};
pub use message::{ActorId, Message, MessageDraft, REPLY_SUBJECT};
pub use messenger::{Messenger, WaitOptions};
pub use registry::PostOffice;
pub use stats::{MailmanStats, StatsSnapshot};
