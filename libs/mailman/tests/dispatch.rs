//! Filter matching as seen through an actor's dispatcher

use mailman::{
    handler_fn, ActorConfig, ActorContext, Callback, DispatchOutcome, Field, FilterSpec,
    MailmanError, Message, MessageDraft, PostOffice,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Pair {
    _post_office: PostOffice,
    a: ActorContext,
    b: ActorContext,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Pair {
    fn new() -> Self {
        let post_office = PostOffice::new();
        let config = |name: &str| ActorConfig::new(name).with_idle_wait(Duration::from_millis(20));
        Self {
            a: ActorContext::open(&post_office, config("a")).unwrap(),
            b: ActorContext::open(&post_office, config("b")).unwrap(),
            _post_office: post_office,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn recorder(&self, tag: &'static str) -> Callback {
        let seen = Arc::clone(&self.seen);
        handler_fn(tag, move |message: Message| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push(format!("{}:{}", tag, message.subject));
                Ok(())
            }
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[tokio::test]
async fn test_fall_through_only_without_predicate_match() {
    let pair = Pair::new();
    pair.a
        .add_filter(FilterSpec::new().id("pings").subject("ping").callback(pair.recorder("ping")))
        .unwrap();
    pair.a
        .add_filter(FilterSpec::new().id("rest").callback(pair.recorder("rest")))
        .unwrap();

    pair.b.messenger().send("a", "ping", 1).unwrap();
    pair.b.messenger().send("a", "status", 2).unwrap();

    let dispatcher = pair.a.dispatcher().unwrap();
    assert_eq!(
        dispatcher.run_once().await,
        DispatchOutcome::Delivered { handlers: 1, failures: 0 }
    );
    assert_eq!(
        dispatcher.run_once().await,
        DispatchOutcome::Delivered { handlers: 1, failures: 0 }
    );
    assert_eq!(dispatcher.run_once().await, DispatchOutcome::Idle);

    assert_eq!(pair.seen(), vec!["ping:ping", "rest:status"]);
}

#[tokio::test]
async fn test_patterns_match_from_start() {
    let pair = Pair::new();
    pair.a
        .add_filter(
            FilterSpec::new()
                .subject("order")
                .sender("b")
                .callback(pair.recorder("orders")),
        )
        .unwrap();

    pair.b.messenger().send("a", "order-created", 1).unwrap();
    pair.b.messenger().send("a", "reorder", 2).unwrap();

    let dispatcher = pair.a.dispatcher().unwrap();
    dispatcher.run_once().await;
    assert_eq!(dispatcher.run_once().await, DispatchOutcome::Unmatched);

    assert_eq!(pair.seen(), vec!["orders:order-created"]);
    assert_eq!(pair.a.stats().messages_unmatched, 1);
}

#[tokio::test]
async fn test_body_and_header_predicates() {
    let pair = Pair::new();
    pair.a
        .add_filter(
            FilterSpec::new()
                .body(r#"\{"kind":"alert""#)
                .header("priority", "high")
                .callback(pair.recorder("alert")),
        )
        .unwrap();

    let messenger = pair.b.messenger();
    messenger
        .send_draft(
            MessageDraft::new("a", "event")
                .body(json!({"kind": "alert"}))
                .header("priority", "high"),
        )
        .unwrap();
    messenger
        .send_draft(MessageDraft::new("a", "event").body(json!({"kind": "alert"})))
        .unwrap();

    let dispatcher = pair.a.dispatcher().unwrap();
    dispatcher.run_once().await;
    dispatcher.run_once().await;

    assert_eq!(pair.seen(), vec!["alert:event"]);
}

#[tokio::test]
async fn test_routes_are_separate_scopes() {
    let pair = Pair::new();
    pair.a
        .add_filter(FilterSpec::new().route("mqtt").callback(pair.recorder("mqtt")))
        .unwrap();
    pair.a
        .add_filter(FilterSpec::new().callback(pair.recorder("local")))
        .unwrap();

    let messenger = pair.b.messenger();
    messenger
        .send_draft(MessageDraft::new("a", "bridged").route("mqtt"))
        .unwrap();
    messenger.send("a", "direct", 0).unwrap();

    let dispatcher = pair.a.dispatcher().unwrap();
    dispatcher.run_once().await;
    dispatcher.run_once().await;

    assert_eq!(pair.seen(), vec!["mqtt:bridged", "local:direct"]);
}

#[tokio::test]
async fn test_duplicate_ids_rejected_per_scope() {
    let pair = Pair::new();
    pair.a
        .add_filter(FilterSpec::new().id("x").subject("a").callback(pair.recorder("first")))
        .unwrap();

    let err = pair
        .a
        .add_filter(FilterSpec::new().id("x").subject("b").callback(pair.recorder("second")))
        .unwrap_err();
    assert!(matches!(err, MailmanError::DuplicateFilterId { .. }));

    pair.a
        .add_filter(
            FilterSpec::new()
                .id("x")
                .route("mqtt")
                .callback(pair.recorder("other-route")),
        )
        .unwrap();

    assert_eq!(pair.a.filters().len(), 2);
    assert_eq!(pair.a.filters().remove_filters_by_id(None, None, &["x"]), 1);
    assert_eq!(pair.a.filters().len(), 1);
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_dispatcher() {
    let pair = Pair::new();
    let failing = handler_fn("failing", |_message: Message| async {
        Err::<(), _>(anyhow::anyhow!("rejected"))
    });
    pair.a
        .add_filter(
            FilterSpec::new()
                .predicate(Field::Subject, "job")
                .callback(failing)
                .callback(pair.recorder("after")),
        )
        .unwrap();

    pair.b.messenger().send("a", "job", 1).unwrap();
    pair.b.messenger().send("a", "job", 2).unwrap();

    let handle = pair.a.spawn_dispatcher().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    assert_eq!(pair.seen(), vec!["after:job", "after:job"]);
    let stats = pair.a.stats();
    assert_eq!(stats.messages_dispatched, 2);
    assert_eq!(stats.handler_failures, 2);
}
