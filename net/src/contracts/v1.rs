/*
Version 1 of the runtime relay contracts. Request and response bodies are JSON, message
payloads are carried as base64 text so that arbitrary bytes survive the trip.
*/

pub mod display;
pub mod payload;
pub mod requests;
pub mod responses;

/// Request paths relative to the endpoint base url
pub mod paths {
    pub const TOPICS: &str = "/v1/runtime/monitor/topics";
    pub const METADATA: &str = "/v1/runtime/metadata";
    pub const SHUTDOWN: &str = "/v1/runtime/shutdown";
    pub const PING: &str = "/v1/runtime/ping";
}
