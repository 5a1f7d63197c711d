use std::time::{SystemTime, UNIX_EPOCH};
use runtime_relay_net::data_types::Timestamp;

pub fn now_epoc_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Timestamp)
        .unwrap_or(0)
}
