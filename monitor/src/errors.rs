use std::fmt;

use runtime_relay_net::data_types::TopicKey;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Connection refused, timeout, server error or a broken response body
    Transient { msg: String },
    /// The remote refused the request, sending it again will not help
    Rejected { status: u16, msg: String },
    /// The remote replied with something that could not be decoded
    Malformed { msg: String },
    /// Republishing locally or persisting an offset failed
    Store { msg: String },
    /// The remote keeps reporting a topic as not found and the policy says to give up
    TopicNotFound { topic: TopicKey },
    /// Consecutive failures went past the configured threshold
    TooManyFailures { count: u32, last: String },
    /// The monitor was configured with values the endpoint would refuse
    InvalidSettings { msg: String },
    /// Work was abandoned because a stop was requested
    Stopped,
    /// The monitor task ended without producing an outcome
    Internal { msg: String },
}

impl RelayError {
    pub fn transient(msg: impl fmt::Display) -> Self {
        RelayError::Transient { msg: msg.to_string() }
    }

    pub fn malformed(msg: impl fmt::Display) -> Self {
        RelayError::Malformed { msg: msg.to_string() }
    }

    pub fn store(msg: impl fmt::Display) -> Self {
        RelayError::Store { msg: msg.to_string() }
    }

    /// Retryable errors keep the monitor polling with backoff, anything else fails it
    pub fn is_retryable(self: &Self) -> bool {
        matches!(self, RelayError::Transient { .. } | RelayError::Store { .. })
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RelayError::Transient { msg } => write!(f, "Transient failure: {msg}"),
            RelayError::Rejected { status, msg } => {
                write!(f, "Request rejected with status {status}: {msg}")
            }
            RelayError::Malformed { msg } => write!(f, "Malformed response: {msg}"),
            RelayError::Store { msg } => write!(f, "Local store failure: {msg}"),
            RelayError::TopicNotFound { topic } => {
                write!(f, "Topic {topic} is not available on the remote")
            }
            RelayError::TooManyFailures { count, last } => {
                write!(f, "Gave up after {count} consecutive failures, last was: {last}")
            }
            RelayError::InvalidSettings { msg } => write!(f, "Invalid settings: {msg}"),
            RelayError::Stopped => write!(f, "Stopped"),
            RelayError::Internal { msg } => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

pub type RelayResult<T> = Result<T, RelayError>;
