use canopy_core::collection::{CollectionId, UserId};
use canopy_core::engine::{MoveError, ParentRef};

pub fn audit_collection_created(
    user_id: UserId,
    collection_id: CollectionId,
    parent_id: Option<CollectionId>,
) {
    tracing::info!(
        target: "audit",
        event = "collection_created",
        user_id = user_id.value(),
        collection_id = collection_id.value(),
        parent_id = parent_id.map(|p| p.value()),
        "collection created"
    );
}

pub fn audit_collection_updated(user_id: UserId, collection_id: CollectionId, member_count: usize) {
    tracing::info!(
        target: "audit",
        event = "collection_updated",
        user_id = user_id.value(),
        collection_id = collection_id.value(),
        member_count = member_count,
        "collection updated"
    );
}

pub fn audit_collection_moved(
    user_id: UserId,
    collection_id: CollectionId,
    destination: ParentRef,
    parent_changed: bool,
) {
    tracing::info!(
        target: "audit",
        event = "collection_moved",
        user_id = user_id.value(),
        collection_id = collection_id.value(),
        destination = %destination,
        parent_changed = parent_changed,
        "collection moved"
    );
}

pub fn audit_move_rejected(user_id: UserId, collection_id: CollectionId, err: &MoveError) {
    tracing::warn!(
        target: "audit",
        event = "move_rejected",
        user_id = user_id.value(),
        collection_id = collection_id.value(),
        reason = err.reason(),
        "move rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Debug)]
    struct CapturedEvent {
        target: String,
        fields: Vec<(String, String)>,
    }

    struct TestLayer {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for TestLayer {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut fields = Vec::new();
            let mut visitor = FieldVisitor(&mut fields);
            event.record(&mut visitor);

            self.events.lock().unwrap().push(CapturedEvent {
                target: event.metadata().target().to_string(),
                fields,
            });
        }
    }

    struct FieldVisitor<'a>(&'a mut Vec<(String, String)>);

    impl tracing::field::Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0
                .push((field.name().to_string(), format!("{value:?}")));
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
            self.0.push((field.name().to_string(), value.to_string()));
        }
    }

    fn with_test_subscriber<F: FnOnce()>(f: F) -> Vec<CapturedEvent> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let layer = TestLayer {
            events: Arc::clone(&events),
        };
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        Arc::try_unwrap(events).unwrap().into_inner().unwrap()
    }

    fn has_field(event: &CapturedEvent, key: &str, value: &str) -> bool {
        event.fields.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn audit_collection_created_emits_ids() {
        let events = with_test_subscriber(|| {
            audit_collection_created(
                UserId::new(1),
                CollectionId::new(7),
                Some(CollectionId::new(3)),
            );
        });

        assert_eq!(events.len(), 1);
        assert!(has_field(&events[0], "event", "collection_created"));
        assert!(has_field(&events[0], "user_id", "1"));
        assert!(has_field(&events[0], "collection_id", "7"));
        assert!(has_field(&events[0], "parent_id", "3"));
    }

    #[test]
    fn audit_collection_moved_names_destination() {
        let events = with_test_subscriber(|| {
            audit_collection_moved(UserId::new(2), CollectionId::new(5), ParentRef::Root, true);
        });

        assert_eq!(events.len(), 1);
        assert!(has_field(&events[0], "event", "collection_moved"));
        assert!(has_field(&events[0], "destination", "root"));
        assert!(has_field(&events[0], "parent_changed", "true"));
    }

    #[test]
    fn audit_move_rejected_includes_reason() {
        let events = with_test_subscriber(|| {
            audit_move_rejected(
                UserId::new(2),
                CollectionId::new(5),
                &MoveError::NoCreateInDestination(CollectionId::new(9)),
            );
        });

        assert_eq!(events.len(), 1);
        assert!(has_field(&events[0], "event", "move_rejected"));
        assert!(has_field(&events[0], "reason", "no_create_in_destination"));
    }

    #[test]
    fn audit_events_use_target_audit() {
        let events = with_test_subscriber(|| {
            audit_collection_created(UserId::new(1), CollectionId::new(1), None);
            audit_collection_updated(UserId::new(1), CollectionId::new(1), 2);
            audit_collection_moved(UserId::new(1), CollectionId::new(1), ParentRef::Root, false);
            audit_move_rejected(
                UserId::new(1),
                CollectionId::new(1),
                &MoveError::CircularMove(CollectionId::new(1)),
            );
        });

        assert_eq!(events.len(), 4);
        for event in &events {
            assert_eq!(
                event.target, "audit",
                "event target should be 'audit', got '{}'",
                event.target
            );
        }
    }
}
