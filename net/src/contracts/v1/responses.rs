/*
Version 1 data contracts for serializing response body
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    data_types::{ErrorCode, MessageId, TopicKey, TopicName},
    error_codes::{ERROR_CODE_STORE_FAILURE, ERROR_CODE_TOPIC_NOT_FOUND},
};

/// Response to topic resolution. Keys with no configuration on the remote side are
/// absent, which callers treat as "not available yet".
pub type TopicMapping = BTreeMap<TopicKey, TopicName>;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MonitorMessage {
    pub id: MessageId,
    #[serde(with = "super::payload")]
    pub payload: Vec<u8>,
}

impl MonitorMessage {
    pub fn new(id: &str, payload: &[u8]) -> Self {
        Self {
            id: id.to_owned(),
            payload: payload.to_vec(),
        }
    }
}

/// One element of the streamed metadata response. A topic can be split across several
/// consecutive elements; the messages in those elements are in store order.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TopicMessages {
    pub topic: TopicKey,
    pub messages: Vec<MonitorMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TopicError>,
}

impl TopicMessages {
    pub fn new(topic: &str, messages: Vec<MonitorMessage>) -> Self {
        Self {
            topic: topic.to_owned(),
            messages,
            error: None,
        }
    }

    pub fn empty(topic: &str) -> Self {
        Self::new(topic, Vec::new())
    }

    pub fn topic_not_found(topic: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            messages: Vec::new(),
            error: Some(TopicError {
                code: ERROR_CODE_TOPIC_NOT_FOUND,
                message: format!("No topic found for {topic}"),
            }),
        }
    }

    pub fn store_failure(topic: &str, msg: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            messages: Vec::new(),
            error: Some(TopicError {
                code: ERROR_CODE_STORE_FAILURE,
                message: msg.to_owned(),
            }),
        }
    }

    pub fn is_topic_not_found(self: &Self) -> bool {
        matches!(&self.error, Some(error) if error.code == ERROR_CODE_TOPIC_NOT_FOUND)
    }

    pub fn last_message_id(self: &Self) -> Option<&MessageId> {
        self.messages.last().map(|message| &message.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TopicError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ShutdownResult {
    pub accepted: bool,
    /// False when an earlier request already triggered the shutdown
    pub first: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_owned(),
        }
    }
}
