/// Typed configuration merged from settings files and the environment
pub mod settings;

/// Errors that can end a poll cycle or the whole relay
pub mod errors;

/// Contract between the poller and the remote relay endpoint
pub mod transport;

/// Http implementation of the transport
pub mod http_client;

/// Exponential backoff with jitter between failed attempts
pub mod backoff;

/// The relay state machine
pub mod poller;

pub use poller::{
    CycleSummary, MonitorHandle, MonitorOutcome, MonitorState, MonitorStopper, RuntimeMonitor,
};
