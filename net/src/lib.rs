/// Aliases for the primitive types exchanged between the endpoint and the monitor
pub mod data_types;

/// Numeric codes returned with error responses
pub mod error_codes;

/// Versioned request and response bodies for the runtime relay http API
pub mod contracts;

/// Incremental decoding of the streamed message batch response
pub mod streaming;

/// Checks applied to request data before it reaches a message store
pub mod validation;
