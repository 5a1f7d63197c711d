/// Resolves topic keys and streams stored messages back to the monitor
pub mod relay_service;

/// One shot trigger for the hosting process's shutdown action
pub mod shutdown_service;
