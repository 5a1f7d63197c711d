/*
Version 1 data contracts for serializing request body
*/

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::data_types::{MessageCount, MessageId, TopicKey};

/// Body of the topic resolution request. The monitor sends the logical keys it was
/// configured with, the endpoint answers with the physical topic names it uses.
pub type TopicKeys = BTreeSet<TopicKey>;

/// Body of the metadata request, one entry per logical topic key so that a single
/// round trip covers every monitored topic.
pub type ConsumeRequests = BTreeMap<TopicKey, ConsumeRequest>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// Messages are returned strictly after this id. None means the start of the topic.
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
    pub limit: MessageCount,
}

impl ConsumeRequest {
    pub fn new(last_message_id: Option<MessageId>, limit: MessageCount) -> Self {
        Self {
            last_message_id,
            limit,
        }
    }

    pub fn from_start(limit: MessageCount) -> Self {
        Self::new(None, limit)
    }
}
