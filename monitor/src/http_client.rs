/*
Talks to the relay endpoint over http using a pooled hyper client. The fetch response
is decoded while it streams in, so each element reaches the sink as soon as its last
byte arrives and the whole body is never held in memory.
*/

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{
    body::Incoming,
    header::{CONTENT_TYPE, HeaderValue},
    Method, Request, Response, StatusCode, Uri,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use log::{debug, warn};
use runtime_relay_net::{
    contracts::v1::{
        paths,
        requests::{ConsumeRequests, TopicKeys},
        responses::{ErrorResponse, ShutdownResult, TopicMapping},
    },
    streaming::TopicMessagesDecoder,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time;

use crate::{
    errors::{RelayError, RelayResult},
    transport::{BatchSink, RelayTransport},
};

/// Replies other than the streamed fetch body are small, anything bigger is refused
const MAX_REPLY_BYTES: usize = 1024 * 1024;

pub struct HttpRelayClient {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl HttpRelayClient {
    pub fn new(base_url: &str, request_timeout: Duration, shutdown_timeout: Duration) -> RelayResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        base_url
            .parse::<Uri>()
            .map_err(|err| RelayError::malformed(format!("Invalid base url {base_url}: {err}")))?;

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url,
            request_timeout,
            shutdown_timeout,
        })
    }

    pub fn base_url(self: &Self) -> &str {
        &self.base_url
    }

    fn uri(self: &Self, path: &str) -> RelayResult<Uri> {
        format!("{}{}", self.base_url, path)
            .parse::<Uri>()
            .map_err(|err| RelayError::malformed(format!("Invalid url for {path}: {err}")))
    }

    async fn post<T: Serialize + ?Sized>(self: &Self, path: &str, body: Option<&T>) -> RelayResult<Response<Incoming>> {
        let body = match body {
            Some(body) => Bytes::from(serde_json::to_vec(body).map_err(RelayError::malformed)?),
            None => Bytes::new(),
        };

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(path)?)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Full::new(body))
            .map_err(RelayError::malformed)?;

        let response = self.client.request(request).await.map_err(RelayError::transient)?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = read_body(response).await.unwrap_or_default();
            Err(classify_failure(status, &body))
        }
    }

    async fn post_for<T: Serialize + ?Sized, R: DeserializeOwned>(self: &Self, path: &str, body: Option<&T>) -> RelayResult<R> {
        let response = self.post(path, body).await?;
        let body = read_body(response).await?;
        serde_json::from_slice(&body).map_err(RelayError::malformed)
    }

    async fn stream_elements(
        self: &Self,
        requests: &ConsumeRequests,
        sink: &mut dyn BatchSink,
    ) -> RelayResult<()> {
        let response = self.post(paths::METADATA, Some(requests)).await?;
        let mut body = response.into_body();
        let mut decoder = TopicMessagesDecoder::new();
        let mut element_count = 0;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(RelayError::transient)?;
            if let Some(data) = frame.data_ref() {
                for element in decoder.push(data).map_err(RelayError::malformed)? {
                    element_count += 1;
                    sink.accept(element)?;
                }
            }
        }
        decoder.finish().map_err(RelayError::malformed)?;

        debug!("HttpRelayClient: Received {element_count} elements for {} topics", requests.len());

        Ok(())
    }
}

async fn read_body(response: Response<Incoming>) -> RelayResult<Bytes> {
    Limited::new(response.into_body(), MAX_REPLY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(RelayError::transient)
}

/// Client errors mean the request itself is wrong so they are not retried, anything
/// else is assumed to be a passing problem on the remote
pub fn classify_failure(status: StatusCode, body: &[u8]) -> RelayError {
    let msg = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(error) => error.message,
        Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
    };

    if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT && status != StatusCode::TOO_MANY_REQUESTS {
        RelayError::Rejected {
            status: status.as_u16(),
            msg,
        }
    } else {
        RelayError::transient(format!("Status {status}: {msg}"))
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn resolve_topics(&self, keys: &TopicKeys) -> RelayResult<TopicMapping> {
        let request = self.post_for::<TopicKeys, TopicMapping>(paths::TOPICS, Some(keys));
        match time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::transient("Timed out resolving topics")),
        }
    }

    async fn fetch(&self, requests: &ConsumeRequests, sink: &mut dyn BatchSink) -> RelayResult<()> {
        match time::timeout(self.request_timeout, self.stream_elements(requests, sink)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("HttpRelayClient: Fetch from {} timed out", self.base_url);
                Err(RelayError::transient("Timed out fetching messages"))
            }
        }
    }

    async fn shutdown(&self) -> RelayResult<ShutdownResult> {
        let request = self.post_for::<(), ShutdownResult>(paths::SHUTDOWN, None);
        match time::timeout(self.shutdown_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::transient("Timed out requesting shutdown")),
        }
    }
}
