//! Ordering properties of mailboxes under waits

use mailman::{ActorConfig, ActorContext, Mailbox, Message, PostOffice};
use proptest::prelude::*;

fn actors() -> (PostOffice, ActorContext, ActorContext) {
    let post_office = PostOffice::new();
    let owner = ActorContext::open(&post_office, ActorConfig::new("owner")).unwrap();
    let peer = ActorContext::open(&post_office, ActorConfig::new("peer")).unwrap();
    (post_office, owner, peer)
}

fn subjects(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.subject.clone()).collect()
}

fn fill(peer: &ActorContext, subjects: &[String]) {
    for subject in subjects {
        peer.messenger().send("owner", subject.as_str(), 0).unwrap();
    }
}

proptest! {
    #[test]
    fn prop_mailbox_is_fifo(sent in prop::collection::vec("[a-z]{1,8}", 0..32)) {
        let (_post_office, owner, peer) = actors();
        fill(&peer, &sent);

        let mut received = Vec::new();
        while let Some(message) = owner.mailbox().try_dequeue() {
            received.push(message.subject);
        }
        prop_assert_eq!(received, sent);
    }

    #[test]
    fn prop_held_messages_return_ahead_of_late_arrivals(
        queued in prop::collection::vec("[a-z]{1,8}", 1..16),
        take in 0usize..16,
        late in prop::collection::vec("[A-Z]{1,8}", 0..8),
    ) {
        let (_post_office, owner, peer) = actors();
        fill(&peer, &queued);
        let take = take.min(queued.len());

        {
            let mailbox: &Mailbox = owner.mailbox();
            let mut view = mailbox.claim_unlocked();
            for _ in 0..take {
                let message = mailbox.try_dequeue().unwrap();
                view.hold(message);
            }
            fill(&peer, &late);
        }

        let expected: Vec<String> = queued.iter().chain(late.iter()).cloned().collect();
        prop_assert_eq!(subjects(&owner.mailbox().snapshot()), expected);
    }
}
