use std::{collections::HashMap, sync::RwLock};

use runtime_relay_net::data_types::{SubscriberName, TopicName};

use crate::{
    offset_store::{GetResult, OffsetError, OffsetStore, PutResult, SubscriberOffset},
    utils::now_epoc_millis,
};

/// Offsets held in a map. Values survive for the life of the store only, which is what
/// tests and a relay with nothing to resume need.
pub struct InMemoryOffsetStore {
    offsets: RwLock<HashMap<(TopicName, SubscriberName), SubscriberOffset>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self {
            offsets: RwLock::new(HashMap::new()),
        }
    }

    pub fn offset(self: &Self, topic: &str, subscriber: &str) -> Option<SubscriberOffset> {
        self.offsets
            .read()
            .ok()?
            .get(&(topic.to_owned(), subscriber.to_owned()))
            .cloned()
    }
}

impl Default for InMemoryOffsetStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> OffsetError {
    OffsetError::Error {
        msg: String::from("In memory offset store lock is poisoned"),
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn get(self: &Self, topic: &str, subscriber: &str) -> GetResult {
        let offsets = self.offsets.read().map_err(|_| poisoned())?;
        Ok(offsets
            .get(&(topic.to_owned(), subscriber.to_owned()))
            .map(|offset| offset.last_id.clone()))
    }

    fn put(self: &Self, topic: &str, subscriber: &str, message_id: &str) -> PutResult {
        let mut offsets = self.offsets.write().map_err(|_| poisoned())?;
        offsets.insert(
            (topic.to_owned(), subscriber.to_owned()),
            SubscriberOffset::new(topic, subscriber, message_id, now_epoc_millis()),
        );
        Ok(())
    }
}
