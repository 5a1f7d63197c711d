use runtime_relay_storage::{
    in_memory::InMemoryMessageStore,
    message_store::{MessageStore, StoreError},
};

fn store_with_messages(topic: &str, count: usize) -> InMemoryMessageStore {
    let store = InMemoryMessageStore::new();
    store.create_topic(topic);
    for i in 1..=count {
        store.publish(topic, format!("m{i}").as_bytes()).unwrap();
    }
    store
}

#[test]
fn should_fetch_from_start_of_topic() {
    let store = store_with_messages("t", 10);

    let messages = store.fetch("t", None, 3).unwrap();

    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].payload, b"m1");
    assert_eq!(messages[2].payload, b"m3");
}

#[test]
fn should_fetch_strictly_after_message_id() {
    let store = store_with_messages("t", 10);
    let first = store.fetch("t", None, 4).unwrap();
    let after = first[3].id.clone();

    let messages = store.fetch("t", Some(&after), 100).unwrap();

    assert_eq!(messages.len(), 6);
    assert_eq!(messages[0].payload, b"m5");
    assert!(messages.iter().all(|message| message.id > after));
}

#[test]
fn should_return_nothing_after_last_message() {
    let store = store_with_messages("t", 2);
    let all = store.fetch("t", None, 10).unwrap();

    let messages = store.fetch("t", Some(&all[1].id), 10).unwrap();

    assert!(messages.is_empty());
}

#[test]
fn should_not_change_store_when_fetching() {
    let store = store_with_messages("t", 5);

    let first = store.fetch("t", None, 5).unwrap();
    let second = store.fetch("t", None, 5).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.message_count("t"), Some(5));
}

#[test]
fn should_keep_ids_ordered_across_topics() {
    let store = InMemoryMessageStore::with_auto_create();
    let a1 = store.publish("a", b"1").unwrap();
    let b1 = store.publish("b", b"1").unwrap();
    let a2 = store.publish("a", b"2").unwrap();

    assert!(a1 < b1 && b1 < a2);
    assert_eq!(store.topic_names(), vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(store.payloads("a"), vec![b"1".to_vec(), b"2".to_vec()]);
}

#[test]
fn should_report_unknown_topic() {
    let store = InMemoryMessageStore::new();

    assert_eq!(
        store.fetch("missing", None, 1),
        Err(StoreError::TopicNotFound {
            topic: "missing".to_owned()
        })
    );
    assert_eq!(
        store.publish("missing", b"x"),
        Err(StoreError::TopicNotFound {
            topic: "missing".to_owned()
        })
    );
}
