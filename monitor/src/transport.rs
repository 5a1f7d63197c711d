/*
The seam between the poller and the network. The poller only talks to the remote
through this trait, which keeps the state machine testable without a server.
*/

use async_trait::async_trait;
use runtime_relay_net::contracts::v1::{
    requests::{ConsumeRequests, TopicKeys},
    responses::{ShutdownResult, TopicMapping, TopicMessages},
};

use crate::errors::RelayResult;

/// Receives the elements of a fetch response one at a time as they are decoded
pub trait BatchSink: Send {
    fn accept(self: &mut Self, batch: TopicMessages) -> RelayResult<()>;
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Keys the remote has no configuration for are absent from the mapping
    async fn resolve_topics(&self, keys: &TopicKeys) -> RelayResult<TopicMapping>;

    /// Sends one combined consume request and passes each element of the response to
    /// the sink in the order received. An error from the sink abandons the response.
    async fn fetch(&self, requests: &ConsumeRequests, sink: &mut dyn BatchSink) -> RelayResult<()>;

    async fn shutdown(&self) -> RelayResult<ShutdownResult>;
}
