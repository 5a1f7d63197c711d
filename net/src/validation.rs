use lazy_static::lazy_static;
use regex::Regex;

use crate::{contracts::v1::requests::ConsumeRequests, data_types::MessageCount};

const TOPIC_KEY_REGEX: &str = r"^[A-Za-z0-9][A-Za-z0-9._\-]*$";
pub const MAX_TOPIC_KEY_LENGTH: usize = 255;

/// Largest per topic limit an endpoint accepts unless configured otherwise
pub const MAX_CONSUME_LIMIT: MessageCount = 10_000;

lazy_static! {
    static ref TOPIC_KEY: Regex = Regex::new(TOPIC_KEY_REGEX).unwrap();
}

pub fn is_valid_topic_key(key: &str) -> bool {
    key.len() <= MAX_TOPIC_KEY_LENGTH && TOPIC_KEY.is_match(key)
}

/// Returns a description of the first problem found, or None if every entry is usable
pub fn check_consume_requests(requests: &ConsumeRequests, max_limit: u32) -> Option<String> {
    for (key, request) in requests {
        if !is_valid_topic_key(key) {
            return Some(format!("'{key}' is not a valid topic key"));
        }
        if request.limit == 0 {
            return Some(format!("The limit for '{key}' must be greater than zero"));
        }
        if request.limit > max_limit {
            return Some(format!(
                "The limit for '{key}' exceeds the maximum of {max_limit}"
            ));
        }
        if let Some(id) = &request.last_message_id {
            if id.is_empty() {
                return Some(format!("The last message id for '{key}' is empty"));
            }
        }
    }
    None
}
