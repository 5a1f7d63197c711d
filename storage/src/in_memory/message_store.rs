use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};

use log::debug;
use runtime_relay_net::data_types::{MessageId, TopicName};

use crate::message_store::{FetchResult, Message, MessageStore, PublishResult, StoreError};

/// Message store that keeps every topic in a vector. Ids are zero padded sequence
/// numbers so that comparing them as strings gives publication order.
pub struct InMemoryMessageStore {
    auto_create_topics: bool,
    next_sequence: AtomicU64,
    topics: RwLock<HashMap<TopicName, Vec<Message>>>,
}

impl InMemoryMessageStore {
    /// Publishing to a topic that was not created fails with TopicNotFound
    pub fn new() -> Self {
        Self {
            auto_create_topics: false,
            next_sequence: AtomicU64::new(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Publishing to an unknown topic creates it
    pub fn with_auto_create() -> Self {
        Self {
            auto_create_topics: true,
            ..Self::new()
        }
    }

    pub fn format_id(sequence: u64) -> MessageId {
        format!("{sequence:020}")
    }

    pub fn create_topic(self: &Self, topic: &str) {
        if let Ok(mut topics) = self.topics.write() {
            topics.entry(topic.to_owned()).or_insert_with(Vec::new);
        }
    }

    pub fn topic_names(self: &Self) -> Vec<TopicName> {
        match self.topics.read() {
            Ok(topics) => {
                let mut names: Vec<TopicName> = topics.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn message_count(self: &Self, topic: &str) -> Option<usize> {
        self.topics.read().ok()?.get(topic).map(|messages| messages.len())
    }

    /// All payloads of a topic in publication order
    pub fn payloads(self: &Self, topic: &str) -> Vec<Vec<u8>> {
        match self.topics.read() {
            Ok(topics) => match topics.get(topic) {
                Some(messages) => messages.iter().map(|m| m.payload.clone()).collect(),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Error {
        msg: String::from("In memory message store lock is poisoned"),
    }
}

impl MessageStore for InMemoryMessageStore {
    fn fetch(self: &Self, topic: &str, after: Option<&str>, limit: usize) -> FetchResult {
        let topics = self.topics.read().map_err(|_| poisoned())?;
        let messages = match topics.get(topic) {
            Some(messages) => messages,
            None => {
                return Err(StoreError::TopicNotFound {
                    topic: topic.to_owned(),
                })
            }
        };

        let start = match after {
            Some(after) => messages.partition_point(|message| message.id.as_str() <= after),
            None => 0,
        };
        let end = messages.len().min(start.saturating_add(limit));

        Ok(messages[start..end].to_vec())
    }

    fn publish(self: &Self, topic: &str, payload: &[u8]) -> PublishResult {
        let mut topics = self.topics.write().map_err(|_| poisoned())?;
        if self.auto_create_topics && !topics.contains_key(topic) {
            topics.insert(topic.to_owned(), Vec::new());
        }
        let messages = match topics.get_mut(topic) {
            Some(messages) => messages,
            None => {
                return Err(StoreError::TopicNotFound {
                    topic: topic.to_owned(),
                })
            }
        };

        let id = Self::format_id(self.next_sequence.fetch_add(1, Ordering::Relaxed));

        #[cfg(debug_assertions)]
        debug!("InMemoryMessageStore: Published {id} to {topic}");

        messages.push(Message {
            id: id.clone(),
            payload: payload.to_vec(),
        });
        Ok(id)
    }
}
