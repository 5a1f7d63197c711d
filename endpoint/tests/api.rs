use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use runtime_relay_endpoint::{
    api_http_warp, observability::Metrics, settings::Settings, App,
};
use runtime_relay_net::{
    contracts::v1::{
        paths,
        responses::{ErrorResponse, ShutdownResult, TopicMapping, TopicMessages},
    },
    error_codes::{ERROR_CODE_MALFORMED_REQUEST, ERROR_CODE_METHOD_NOT_ALLOWED, ERROR_CODE_NOT_FOUND},
    streaming::TopicMessagesDecoder,
};
use runtime_relay_storage::{in_memory::InMemoryMessageStore, message_store::MessageStore};
use serde_json::json;
use warp::http::StatusCode;

struct TestContext {
    app: Arc<App>,
    store: Arc<InMemoryMessageStore>,
    shutdown_runs: Arc<AtomicUsize>,
}

fn build_context() -> TestContext {
    let mut settings = Settings::default();
    settings.relay.chunk_size = 512;
    settings.relay.max_messages_per_read = 7;
    settings.server.max_request_bytes = 4096;
    settings.topics.insert("logs".to_owned(), "program-logs".to_owned());
    settings.topics.insert("program-status".to_owned(), "program-status-events".to_owned());
    settings.topics.insert("metrics".to_owned(), "".to_owned());

    let store = Arc::new(InMemoryMessageStore::new());
    store.create_topic("program-logs");
    store.create_topic("program-status-events");

    let shutdown_runs = Arc::new(AtomicUsize::new(0));
    let action_runs = shutdown_runs.clone();

    let app = Arc::new(App::new(
        settings,
        store.clone(),
        Arc::new(Metrics::disabled()),
        Arc::new(AtomicBool::new(false)),
        Arc::new(move || {
            action_runs.fetch_add(1, Ordering::SeqCst);
        }),
    ));

    TestContext {
        app,
        store,
        shutdown_runs,
    }
}

fn publish(store: &InMemoryMessageStore, topic: &str, count: usize) {
    for i in 1..=count {
        store.publish(topic, format!("{topic}-{i}").as_bytes()).unwrap();
    }
}

fn decode(body: &[u8]) -> Vec<TopicMessages> {
    let mut decoder = TopicMessagesDecoder::new();
    let elements = decoder.push(body).unwrap();
    decoder.finish().unwrap();
    elements
}

fn payloads(elements: &[TopicMessages], topic: &str) -> Vec<String> {
    elements
        .iter()
        .filter(|element| element.topic == topic)
        .flat_map(|element| element.messages.iter())
        .map(|message| String::from_utf8(message.payload.clone()).unwrap())
        .collect()
}

#[tokio::test]
async fn ping_should_reply_pong() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("GET")
        .path(paths::PING)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"pong");
}

#[tokio::test]
async fn topics_should_omit_unresolved_keys() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::TOPICS)
        .json(&json!(["logs", "metrics", "unknown"]))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let mapping: TopicMapping = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping.get("logs"), Some(&"program-logs".to_owned()));
}

#[tokio::test]
async fn topics_should_reject_invalid_keys() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::TOPICS)
        .json(&json!(["logs", "../secrets"]))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.code, ERROR_CODE_MALFORMED_REQUEST);
}

#[tokio::test]
async fn metadata_should_stream_each_topic_in_order() {
    let context = build_context();
    publish(&context.store, "program-logs", 40);
    publish(&context.store, "program-status-events", 3);
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .json(&json!({
            "logs": { "lastMessageId": null, "limit": 30 },
            "program-status": { "limit": 10 }
        }))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json; charset=utf-8"
    );

    let elements = decode(response.body());
    let expected_logs: Vec<String> = (1..=30).map(|i| format!("program-logs-{i}")).collect();
    assert_eq!(payloads(&elements, "logs"), expected_logs);
    assert_eq!(
        payloads(&elements, "program-status"),
        vec!["program-status-events-1", "program-status-events-2", "program-status-events-3"]
    );

    // logs is split into sub-batches of 7 and its elements come before program-status
    let logs_elements = elements.iter().filter(|element| element.topic == "logs").count();
    assert_eq!(logs_elements, 5);
    assert_eq!(elements.last().unwrap().topic, "program-status");
}

#[tokio::test]
async fn metadata_should_resume_after_last_message_id() {
    let context = build_context();
    publish(&context.store, "program-logs", 10);
    let routes = api_http_warp::routes(&context.app);
    let after = InMemoryMessageStore::format_id(8);

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .json(&json!({ "logs": { "lastMessageId": after, "limit": 100 } }))
        .reply(&routes)
        .await;

    let elements = decode(response.body());
    assert_eq!(payloads(&elements, "logs"), vec!["program-logs-9", "program-logs-10"]);
}

#[tokio::test]
async fn metadata_should_report_missing_topics_per_entry() {
    let context = build_context();
    publish(&context.store, "program-logs", 2);
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .json(&json!({
            "logs": { "limit": 10 },
            "metrics": { "limit": 10 },
            "unknown": { "limit": 10 }
        }))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let elements = decode(response.body());
    assert_eq!(payloads(&elements, "logs"), vec!["program-logs-1", "program-logs-2"]);

    for key in ["metrics", "unknown"] {
        let element = elements.iter().find(|element| element.topic == key).unwrap();
        assert!(element.is_topic_not_found());
        assert!(element.messages.is_empty());
    }
}

#[tokio::test]
async fn metadata_should_return_empty_element_for_drained_topic() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .json(&json!({ "logs": { "limit": 10 } }))
        .reply(&routes)
        .await;

    assert_eq!(decode(response.body()), vec![TopicMessages::empty("logs")]);
}

#[tokio::test]
async fn metadata_should_reject_bad_requests() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let bodies = [
        json!({ "logs": { "limit": 0 } }),
        json!({ "logs": { "lastMessageId": "" , "limit": 5 } }),
        json!({ "logs": { "lastMessageId": 5 } }),
        json!({ "bad key": { "limit": 5 } }),
        json!(["logs"]),
    ];

    for body in bodies {
        let response = warp::test::request()
            .method("POST")
            .path(paths::METADATA)
            .json(&body)
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(error.code, ERROR_CODE_MALFORMED_REQUEST);
    }

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metadata_should_reject_oversized_body() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("POST")
        .path(paths::METADATA)
        .header("content-type", "application/json")
        .body(vec![b' '; 8192])
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn shutdown_should_trigger_once() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let mut results = Vec::new();
    for _ in 0..2 {
        let response = warp::test::request()
            .method("POST")
            .path(paths::SHUTDOWN)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let result: ShutdownResult = serde_json::from_slice(response.body()).unwrap();
        results.push(result);
    }

    assert_eq!(results[0], ShutdownResult { accepted: true, first: true });
    assert_eq!(results[1], ShutdownResult { accepted: true, first: false });

    for _ in 0..50 {
        if context.shutdown_runs.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(context.shutdown_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_routes_and_methods_should_be_reported() {
    let context = build_context();
    let routes = api_http_warp::routes(&context.app);

    let response = warp::test::request()
        .method("GET")
        .path("/v1/runtime/nothing-here")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.code, ERROR_CODE_NOT_FOUND);

    let response = warp::test::request()
        .method("GET")
        .path(paths::SHUTDOWN)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.code, ERROR_CODE_METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn server_should_stop_on_stop_signal() {
    let context = build_context();
    let (addr, server) = api_http_warp::serve(&context.app, "127.0.0.1:0".parse().unwrap()).unwrap();
    assert_ne!(addr.port(), 0);

    let handle = tokio::spawn(server);
    context.app.stop_signal.store(true, Ordering::Relaxed);

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
