/*
Provides the read side of the relay. The monitor names topics by logical key, this
service maps each key to a local topic, reads from the message store in bounded
sub-batches and writes one response element per sub-batch, so neither a large limit
nor a large number of topics causes the whole result to be held in memory.
*/

use std::sync::Arc;

use log::{debug, warn};
use runtime_relay_net::contracts::v1::{
    requests::{ConsumeRequests, TopicKeys},
    responses::{MonitorMessage, TopicMapping, TopicMessages},
};
use runtime_relay_storage::message_store::{MessageStore, StoreError};

use crate::{
    chunked::{ChunkError, ChunkResult, ChunkSink, ChunkedWriter},
    observability::Metrics,
    topics::TopicResolver,
};

pub struct RelayService {
    store: Arc<dyn MessageStore>,
    resolver: Arc<TopicResolver>,
    max_messages_per_read: usize,
    metrics: Arc<Metrics>,
}

/// Tracks whether the next element written needs a leading separator
struct ElementWriter<'a, S: ChunkSink> {
    writer: &'a mut ChunkedWriter<S>,
    element_count: usize,
}

impl<'a, S: ChunkSink> ElementWriter<'a, S> {
    fn write(self: &mut Self, element: &TopicMessages) -> ChunkResult {
        let separator = if self.element_count == 0 { None } else { Some(b',') };
        self.writer.write_json(separator, element)?;
        self.element_count += 1;
        Ok(())
    }
}

impl RelayService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        resolver: Arc<TopicResolver>,
        max_messages_per_read: usize,
        metrics: &Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            resolver,
            max_messages_per_read: max_messages_per_read.max(1),
            metrics: Arc::clone(metrics),
        }
    }

    pub fn resolve_topics(self: &Self, keys: &TopicKeys) -> TopicMapping {
        let mapping = self.resolver.resolve_all(keys);

        #[cfg(debug_assertions)]
        debug!("RelayService: Resolved {} of {} topic keys", mapping.len(), keys.len());

        mapping
    }

    /// Writes the whole response body as a JSON array of topic message elements and
    /// returns the number of messages written. Problems with individual topics are
    /// reported inside the body, the only errors returned are from the writer.
    pub fn stream_messages<S: ChunkSink>(
        self: &Self,
        requests: &ConsumeRequests,
        writer: &mut ChunkedWriter<S>,
    ) -> Result<usize, ChunkError> {
        writer.write_raw(b"[")?;

        let mut elements = ElementWriter { writer, element_count: 0 };
        let mut message_count = 0;

        for (key, request) in requests {
            message_count += self.stream_topic(
                key,
                request.last_message_id.as_deref(),
                request.limit as usize,
                &mut elements,
            )?;
        }

        writer.write_raw(b"]")?;
        writer.flush()?;

        self.metrics.count(Metrics::METRIC_RELAY_MESSAGE_COUNT, message_count as f64);
        Ok(message_count)
    }

    fn stream_topic<S: ChunkSink>(
        self: &Self,
        key: &str,
        after: Option<&str>,
        limit: usize,
        elements: &mut ElementWriter<S>,
    ) -> Result<usize, ChunkError> {
        let topic = match self.resolver.resolve(key) {
            Some(topic) => topic,
            None => {
                self.metrics.incr(Metrics::METRIC_RELAY_TOPIC_NOT_FOUND_COUNT);
                elements.write(&TopicMessages::topic_not_found(key))?;
                return Ok(0);
            }
        };

        let mut after = after.map(|id| id.to_owned());
        let mut remaining = limit;
        let mut written = 0;
        let mut wrote_element = false;

        while remaining > 0 {
            let batch_size = remaining.min(self.max_messages_per_read);

            let messages = match self.store.fetch(topic, after.as_deref(), batch_size) {
                Ok(messages) => messages,
                Err(StoreError::TopicNotFound { .. }) => {
                    self.metrics.incr(Metrics::METRIC_RELAY_TOPIC_NOT_FOUND_COUNT);
                    elements.write(&TopicMessages::topic_not_found(key))?;
                    return Ok(written);
                }
                Err(err) => {
                    warn!("RelayService: Failed to read topic {topic} for {key}: {err}");
                    self.metrics.incr(Metrics::METRIC_RELAY_STORE_ERROR_COUNT);
                    elements.write(&TopicMessages::store_failure(key, &err.to_string()))?;
                    return Ok(written);
                }
            };

            let count = messages.len();
            if let Some(last) = messages.last() {
                after = Some(last.id.clone());
            }

            if count > 0 {
                let messages = messages
                    .into_iter()
                    .map(|message| MonitorMessage {
                        id: message.id,
                        payload: message.payload,
                    })
                    .collect();
                elements.write(&TopicMessages::new(key, messages))?;
                wrote_element = true;
                written += count;
                remaining -= count;
            }

            if count < batch_size {
                break;
            }
        }

        if !wrote_element {
            elements.write(&TopicMessages::empty(key))?;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use runtime_relay_net::contracts::v1::{
        requests::{ConsumeRequest, ConsumeRequests},
        responses::TopicMessages,
    };
    use runtime_relay_storage::{
        in_memory::InMemoryMessageStore,
        message_store::{FetchResult, MessageStore, PublishResult, StoreError},
    };

    use super::RelayService;
    use crate::{chunked::{tests::VecSink, ChunkedWriter}, observability::Metrics, topics::TopicResolver};

    fn build_service(store: Arc<dyn MessageStore>, max_messages_per_read: usize) -> RelayService {
        let mut mapping = BTreeMap::new();
        mapping.insert("logs".to_owned(), "program.logs".to_owned());
        mapping.insert("status".to_owned(), "program.status".to_owned());
        let resolver = Arc::new(TopicResolver::new(mapping));
        RelayService::new(store, resolver, max_messages_per_read, &Arc::new(Metrics::disabled()))
    }

    fn seeded_store(count: usize) -> Arc<InMemoryMessageStore> {
        let store = Arc::new(InMemoryMessageStore::new());
        store.create_topic("program.logs");
        store.create_topic("program.status");
        for i in 1..=count {
            store.publish("program.logs", format!("m{i}").as_bytes()).unwrap();
        }
        store
    }

    fn run(service: &RelayService, requests: &ConsumeRequests, chunk_size: usize) -> (Vec<TopicMessages>, VecSink) {
        let mut writer = ChunkedWriter::new(VecSink::default(), chunk_size);
        service.stream_messages(requests, &mut writer).unwrap();
        let sink = writer.into_sink();
        let elements: Vec<TopicMessages> = serde_json::from_slice(&sink.body()).unwrap();
        (elements, sink)
    }

    fn payloads(elements: &[TopicMessages], topic: &str) -> Vec<String> {
        elements
            .iter()
            .filter(|element| element.topic == topic)
            .flat_map(|element| element.messages.iter())
            .map(|message| String::from_utf8(message.payload.clone()).unwrap())
            .collect()
    }

    #[test]
    fn should_stop_at_limit() {
        let store = seeded_store(10);
        let service = build_service(store.clone(), 100);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(2));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(payloads(&elements, "logs"), vec!["m1", "m2"]);
    }

    #[test]
    fn should_start_after_last_message_id() {
        let store = seeded_store(10);
        let service = build_service(store.clone(), 100);
        let third = InMemoryMessageStore::format_id(3);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::new(Some(third.clone()), 3));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(payloads(&elements, "logs"), vec!["m4", "m5", "m6"]);
        for element in &elements {
            for message in &element.messages {
                assert!(message.id > third);
            }
        }
    }

    #[test]
    fn should_split_large_limit_into_sub_batches() {
        let store = seeded_store(25);
        let service = build_service(store.clone(), 10);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(1000));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].messages.len(), 10);
        assert_eq!(elements[1].messages.len(), 10);
        assert_eq!(elements[2].messages.len(), 5);

        let expected: Vec<String> = (1..=25).map(|i| format!("m{i}")).collect();
        assert_eq!(payloads(&elements, "logs"), expected);
    }

    #[test]
    fn should_write_empty_element_when_nothing_new() {
        let store = seeded_store(3);
        let service = build_service(store.clone(), 100);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(5));
        requests.insert("status".to_owned(), ConsumeRequest::from_start(5));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1], TopicMessages::empty("status"));
    }

    #[test]
    fn should_report_unknown_key_without_failing_others() {
        let store = seeded_store(2);
        let service = build_service(store.clone(), 100);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(5));
        requests.insert("metrics".to_owned(), ConsumeRequest::from_start(5));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(payloads(&elements, "logs"), vec!["m1", "m2"]);
        let metrics: Vec<&TopicMessages> = elements.iter().filter(|e| e.topic == "metrics").collect();
        assert_eq!(metrics.len(), 1);
        assert!(metrics[0].is_topic_not_found());
    }

    #[test]
    fn should_flush_before_everything_is_written() {
        let store = seeded_store(500);
        let service = build_service(store.clone(), 100);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(500));
        let (elements, sink) = run(&service, &requests, 256);

        assert!(sink.chunks.len() > 1);
        assert!(sink.chunks[0].len() < sink.body().len() / 2);
        assert_eq!(payloads(&elements, "logs").len(), 500);
    }

    #[test]
    fn should_stop_streaming_when_receiver_goes_away() {
        let store = seeded_store(500);
        let service = build_service(store.clone(), 10);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(500));
        let sink = VecSink {
            accept_limit: Some(2),
            ..VecSink::default()
        };
        let mut writer = ChunkedWriter::new(sink, 64);

        assert!(service.stream_messages(&requests, &mut writer).is_err());
        assert_eq!(writer.into_sink().chunks.len(), 2);
    }

    struct FailingStore;

    impl MessageStore for FailingStore {
        fn fetch(self: &Self, _topic: &str, _after: Option<&str>, _limit: usize) -> FetchResult {
            Err(StoreError::Error {
                msg: "disk unavailable".to_owned(),
            })
        }

        fn publish(self: &Self, _topic: &str, _payload: &[u8]) -> PublishResult {
            Ok(String::new())
        }
    }

    #[test]
    fn should_report_store_failures_per_topic() {
        let service = build_service(Arc::new(FailingStore), 100);

        let mut requests = ConsumeRequests::new();
        requests.insert("logs".to_owned(), ConsumeRequest::from_start(5));
        requests.insert("status".to_owned(), ConsumeRequest::from_start(5));
        let (elements, _) = run(&service, &requests, 8192);

        assert_eq!(elements.len(), 2);
        for element in &elements {
            assert!(element.messages.is_empty());
            assert!(element.error.is_some());
            assert!(!element.is_topic_not_found());
        }
    }
}
