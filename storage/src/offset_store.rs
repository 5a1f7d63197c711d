/*
Durable mapping from (topic, subscriber) to the id of the last message that subscriber
has finished with. There is exactly one record per pair, it is overwritten on each
commit and a committed value must survive a process restart.
*/

use std::fmt;

use chrono::{DateTime, Utc};
use runtime_relay_net::data_types::{MessageId, SubscriberName, Timestamp, TopicName};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberOffset {
    pub topic: TopicName,
    pub subscriber: SubscriberName,
    pub last_id: MessageId,
    pub committed: Timestamp,
}

impl SubscriberOffset {
    pub fn new(topic: &str, subscriber: &str, last_id: &str, committed: Timestamp) -> Self {
        Self {
            topic: topic.to_owned(),
            subscriber: subscriber.to_owned(),
            last_id: last_id.to_owned(),
            committed,
        }
    }

    pub fn committed_at(self: &Self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.committed as i64).unwrap_or_default()
    }
}

#[derive(Debug, PartialEq)]
pub enum OffsetError {
    Error { msg: String },
    Corrupt { topic: String, subscriber: String, msg: String },
}

impl fmt::Display for OffsetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OffsetError::Error { msg } => write!(f, "Offset store failure: {msg}"),
            OffsetError::Corrupt {
                topic,
                subscriber,
                msg,
            } => write!(f, "Stored offset for {topic}/{subscriber} is unreadable: {msg}"),
        }
    }
}

impl std::error::Error for OffsetError {}

pub type GetResult = Result<Option<MessageId>, OffsetError>;
pub type PutResult = Result<(), OffsetError>;

pub trait OffsetStore: Send + Sync {
    /// Returns the last committed message id, or None if this subscriber has never
    /// committed an offset for this topic
    fn get(self: &Self, topic: &str, subscriber: &str) -> GetResult;

    /// Replaces the committed message id. Once this returns Ok the value is visible to
    /// every later reader, including one in a restarted process.
    fn put(self: &Self, topic: &str, subscriber: &str, message_id: &str) -> PutResult;
}
