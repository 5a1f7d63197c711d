use super::{
    requests::ConsumeRequest,
    responses::{ErrorResponse, MonitorMessage, TopicError, TopicMessages},
};
use std::fmt::Display;

impl Display for ConsumeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.last_message_id {
            Some(id) => write!(f, "after:{} limit:{}", id, self.limit),
            None => write!(f, "from start limit:{}", self.limit),
        }
    }
}

impl Display for MonitorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id:{} bytes:{}", self.id, self.payload.len())
    }
}

impl Display for TopicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

impl Display for TopicMessages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(error) => write!(f, "topic:{} {}", self.topic, error),
            None => match (self.messages.first(), self.messages.last()) {
                (Some(first), Some(last)) => write!(
                    f,
                    "topic:{} {} messages {}..{}",
                    self.topic,
                    self.messages.len(),
                    first.id,
                    last.id
                ),
                _ => write!(f, "topic:{} no messages", self.topic),
            },
        }
    }
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}
