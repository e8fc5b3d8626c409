//! Dispatcher ("mailman")
//!
//! One loop per actor: take the next message from the mailbox, match it
//! against the actor's filters, run the matched callbacks one after the
//! other. The consumer lock is held only while dequeuing, never while a
//! callback runs, so a callback may itself wait for a reply on this actor.
//!
//! ```text
//!            message dequeued
//!   ┌──────┐ ───────────────▶ ┌─────────────┐
//!   │ Idle │                  │ Dispatching │
//!   └──────┘ ◀─────────────── └─────────────┘
//!     ▲  │   callbacks done
//!     └──┘ idle wait elapsed
//! ```

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::filter::FilterRegistry;
use crate::mailbox::Mailbox;
use crate::message::{ActorId, Message};
use crate::stats::MailmanStats;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    /// Blocked on the mailbox, or between cycles
    Idle = 0,
    /// Running the callbacks for a message in hand
    Dispatching = 1,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DispatcherState::Dispatching,
            _ => DispatcherState::Idle,
        }
    }
}

/// What one dispatch cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing arrived within the idle wait
    Idle,
    /// A message arrived but no filter selected a callback
    Unmatched,
    /// Callbacks ran; `failures` of them returned an error or panicked
    Delivered { handlers: usize, failures: usize },
}

/// Mailbox-draining loop of one actor
pub struct Dispatcher {
    actor: ActorId,
    mailbox: Arc<Mailbox>,
    filters: Arc<FilterRegistry>,
    idle_wait: Duration,
    state: Arc<AtomicU8>,
    stats: Arc<MailmanStats>,
}

impl Dispatcher {
    /// Fails when `config` has a zero idle wait
    pub fn new(
        mailbox: Arc<Mailbox>,
        filters: Arc<FilterRegistry>,
        config: &DispatcherConfig,
        stats: Arc<MailmanStats>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            actor: mailbox.owner().clone(),
            mailbox,
            filters,
            idle_wait: config.idle_wait(),
            state: Arc::new(AtomicU8::new(DispatcherState::Idle as u8)),
            stats,
        })
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// One cycle: wait up to the idle window for a message and dispatch it
    pub async fn run_once(&self) -> DispatchOutcome {
        let next = {
            let mut view = self.mailbox.claim().await;
            view.dequeue(self.idle_wait).await
        };

        let Some(message) = next else {
            return DispatchOutcome::Idle;
        };

        self.set_state(DispatcherState::Dispatching);
        let outcome = self.dispatch(&message).await;
        self.set_state(DispatcherState::Idle);
        outcome
    }

    /// Match `message` and run its callbacks in order
    pub async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        let matched = self.filters.matching(
            Some(self.actor.as_str()),
            Some(message.route.as_str()),
            message,
        );

        if matched.is_empty() {
            self.stats.record_dispatch(false, 0);
            debug!(
                actor = %self.actor,
                route = %message.route,
                subject = %message.subject,
                messageid = %message.messageid,
                "No filter matched message"
            );
            return DispatchOutcome::Unmatched;
        }

        debug!(
            actor = %self.actor,
            route = %message.route,
            subject = %message.subject,
            filters = ?matched.filter_ids,
            fall_through = matched.fall_through,
            "Dispatching message"
        );

        let mut failures = 0;
        for callback in &matched.callbacks {
            match AssertUnwindSafe(callback.handle(message))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(
                        actor = %self.actor,
                        handler = callback.name(),
                        messageid = %message.messageid,
                        error = %e,
                        "Message handler failed"
                    );
                }
                Err(panic) => {
                    failures += 1;
                    error!(
                        actor = %self.actor,
                        handler = callback.name(),
                        messageid = %message.messageid,
                        panic = panic_message(panic.as_ref()),
                        "Message handler panicked"
                    );
                }
            }
        }

        self.stats.record_dispatch(true, failures as u64);
        DispatchOutcome::Delivered {
            handlers: matched.callbacks.len(),
            failures,
        }
    }

    /// Dispatch until `shutdown` fires or its sender is dropped
    ///
    /// Shutdown is checked between cycles; a cycle in progress finishes.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(actor = %self.actor, "Dispatcher started");

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => break,
            }
            self.run_once().await;
        }

        info!(
            actor = %self.actor,
            pending = self.mailbox.len(),
            "Dispatcher stopped"
        );
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown, receiver) = broadcast::channel(1);
        let actor = self.actor.clone();
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move { self.run(receiver).await });

        DispatcherHandle {
            actor,
            state,
            shutdown,
            task,
        }
    }
}

/// Owner's handle to a spawned dispatcher; dropping it also stops the loop
pub struct DispatcherHandle {
    actor: ActorId,
    state: Arc<AtomicU8>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for it to exit
    pub async fn shutdown(self) {
        // An error only means the loop already exited.
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(actor = %self.actor, error = %e, "Dispatcher task ended abnormally");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}
