//! Actor Context
//!
//! Wires one actor's mailbox, filters, messenger and dispatcher from a
//! single [`ActorConfig`]. Starting and stopping the dispatcher belongs to
//! whoever runs the actor; this type only builds the pieces.

use crate::config::ActorConfig;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::error::Result;
use crate::filter::{Filter, FilterRegistry, FilterSpec};
use crate::mailbox::Mailbox;
use crate::message::{ActorId, Message};
use crate::messenger::Messenger;
use crate::registry::PostOffice;
use crate::stats::{MailmanStats, StatsSnapshot};
use std::sync::Arc;
use tracing::info;

/// Messaging state owned by one actor
#[derive(Debug)]
pub struct ActorContext {
    config: ActorConfig,
    mailbox: Arc<Mailbox>,
    filters: Arc<FilterRegistry>,
    messenger: Messenger,
    stats: Arc<MailmanStats>,
    post_office: PostOffice,
}

impl ActorContext {
    /// Create the actor's mailbox and register it with `post_office`
    pub fn open(post_office: &PostOffice, config: ActorConfig) -> Result<Self> {
        config.validate()?;

        let mailbox = Arc::new(Mailbox::new(config.name.clone()));
        let stats = Arc::new(MailmanStats::default());
        let filters = Arc::new(FilterRegistry::new(
            config.name.clone(),
            config.default_route.clone(),
        ));
        let messenger = Messenger::new(
            Arc::clone(&mailbox),
            post_office.clone(),
            config.default_route.clone(),
            config.correlation.clone(),
            Arc::clone(&stats),
        )?;

        post_office.register(Arc::clone(&mailbox))?;

        info!(actor = %config.name, route = %config.default_route, "Actor opened");

        Ok(Self {
            config,
            mailbox,
            filters,
            messenger,
            stats,
            post_office: post_office.clone(),
        })
    }

    pub fn id(&self) -> &ActorId {
        &self.config.name
    }

    pub fn config(&self) -> &ActorConfig {
        &self.config
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shorthand for [`FilterRegistry::add_filter`]
    pub fn add_filter(&self, spec: FilterSpec) -> Result<Filter> {
        self.filters.add_filter(spec)
    }

    /// Build this actor's dispatcher without starting it
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        Dispatcher::new(
            Arc::clone(&self.mailbox),
            Arc::clone(&self.filters),
            &self.config.dispatcher,
            Arc::clone(&self.stats),
        )
    }

    /// Start this actor's dispatcher on its own task
    pub fn spawn_dispatcher(&self) -> Result<DispatcherHandle> {
        Ok(self.dispatcher()?.spawn())
    }

    /// Unregister the mailbox; returns messages that were never consumed
    pub fn close(self) -> Vec<Message> {
        self.post_office.unregister(&self.config.name);
        let undelivered = self.mailbox.drain_all();
        info!(
            actor = %self.config.name,
            undelivered = undelivered.len(),
            "Actor closed"
        );
        undelivered
    }
}
