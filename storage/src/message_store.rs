/*
The message store is the broker that holds topic messages on each side of the relay.
The relay only reads from it on the remote side and only appends to it on the control
plane side, so these two operations are the whole contract.
*/

use std::fmt;

use runtime_relay_net::data_types::MessageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    TopicNotFound { topic: String },
    Error { msg: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::TopicNotFound { topic } => write!(f, "No topic found with name {topic}"),
            StoreError::Error { msg } => write!(f, "Message store failure: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type FetchResult = Result<Vec<Message>, StoreError>;
pub type PublishResult = Result<MessageId, StoreError>;

pub trait MessageStore: Send + Sync {
    /// Returns up to `limit` messages with ids strictly after `after`, in store order.
    /// When `after` is None the fetch starts at the beginning of the topic. This must
    /// not change the state of the store.
    fn fetch(self: &Self, topic: &str, after: Option<&str>, limit: usize) -> FetchResult;

    /// Appends a message to the end of a topic and returns the id it was given
    fn publish(self: &Self, topic: &str, payload: &[u8]) -> PublishResult;
}
