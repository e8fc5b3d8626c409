//! Post Office
//!
//! Directory of actor mailboxes for the current process. `send` resolves
//! recipients here; transport bridges look up the mailbox they feed the same
//! way. Only [`Mailbox::enqueue`] is ever reached through this directory, so
//! one actor can append to another's mailbox but never drain it.

use crate::error::{MailmanError, Result};
use crate::mailbox::Mailbox;
use crate::message::{ActorId, Message};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-local mailbox directory
#[derive(Debug, Clone, Default)]
pub struct PostOffice {
    mailboxes: Arc<RwLock<HashMap<ActorId, Arc<Mailbox>>>>,
}

impl PostOffice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mailbox under its owner's id
    pub fn register(&self, mailbox: Arc<Mailbox>) -> Result<()> {
        let id = mailbox.owner().clone();
        let mut mailboxes = self.mailboxes.write();
        if mailboxes.contains_key(&id) {
            return Err(MailmanError::DuplicateActor(id));
        }

        debug!(actor = %id, "Registering mailbox");
        mailboxes.insert(id, mailbox);
        Ok(())
    }

    /// Remove a mailbox; queued messages go with it
    pub fn unregister(&self, id: &ActorId) -> Option<Arc<Mailbox>> {
        let removed = self.mailboxes.write().remove(id);
        match &removed {
            Some(mailbox) => debug!(actor = %id, pending = mailbox.len(), "Unregistered mailbox"),
            None => warn!(actor = %id, "Attempted to unregister unknown mailbox"),
        }
        removed
    }

    pub fn lookup(&self, id: &ActorId) -> Option<Arc<Mailbox>> {
        self.mailboxes.read().get(id).cloned()
    }

    /// Append `message` to its recipient's mailbox
    pub fn deliver(&self, message: Message) -> Result<()> {
        let mailbox = self
            .lookup(&message.recipient)
            .ok_or_else(|| MailmanError::UnknownRecipient(message.recipient.clone()))?;
        mailbox.enqueue(message);
        Ok(())
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.mailboxes.read().contains_key(id)
    }

    pub fn actors(&self) -> Vec<ActorId> {
        let mut actors: Vec<ActorId> = self.mailboxes.read().keys().cloned().collect();
        actors.sort();
        actors
    }

    pub fn len(&self) -> usize {
        self.mailboxes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageDraft;

    #[test]
    fn test_register_and_lookup() {
        let post_office = PostOffice::new();
        post_office.register(Arc::new(Mailbox::new("a"))).unwrap();

        let id = ActorId::from("a");
        assert!(post_office.contains(&id));
        assert_eq!(post_office.len(), 1);
        assert_eq!(post_office.lookup(&id).unwrap().owner(), &id);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let post_office = PostOffice::new();
        post_office.register(Arc::new(Mailbox::new("a"))).unwrap();

        let err = post_office.register(Arc::new(Mailbox::new("a"))).unwrap_err();
        assert!(matches!(err, MailmanError::DuplicateActor(ref id) if id.as_str() == "a"));
    }

    #[test]
    fn test_deliver_routes_to_recipient() {
        let post_office = PostOffice::new();
        let mailbox = Arc::new(Mailbox::new("b"));
        post_office.register(Arc::clone(&mailbox)).unwrap();

        let message = MessageDraft::new("b", "hi").stamp(&ActorId::from("a"), "local");
        post_office.deliver(message).unwrap();
        assert_eq!(mailbox.len(), 1);

        let stray = MessageDraft::new("nobody", "hi").stamp(&ActorId::from("a"), "local");
        assert!(matches!(
            post_office.deliver(stray),
            Err(MailmanError::UnknownRecipient(_))
        ));
    }

    #[test]
    fn test_unregister_and_list() {
        let post_office = PostOffice::new();
        post_office.register(Arc::new(Mailbox::new("b"))).unwrap();
        post_office.register(Arc::new(Mailbox::new("a"))).unwrap();

        assert_eq!(post_office.actors(), vec![ActorId::from("a"), ActorId::from("b")]);

        assert!(post_office.unregister(&ActorId::from("a")).is_some());
        assert!(post_office.unregister(&ActorId::from("a")).is_none());
        assert_eq!(post_office.len(), 1);
    }
}
