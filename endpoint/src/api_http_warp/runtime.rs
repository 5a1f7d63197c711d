use super::{with_app, MalformedRequest};
use crate::{
    chunked::{ChannelSink, ChunkError, ChunkedWriter},
    observability::Metrics,
    App,
};
use log::{debug, info, warn};
use runtime_relay_net::{
    contracts::v1::{
        requests::{ConsumeRequests, TopicKeys},
        responses::ShutdownResult,
    },
    validation::{check_consume_requests, is_valid_topic_key},
};
use std::sync::Arc;
use tokio::{sync::mpsc, task};
use tokio_stream::wrappers::ReceiverStream;
use warp::{
    body, get,
    http::{header::CONTENT_TYPE, HeaderValue, Response},
    hyper::Body,
    path, post, reply, Filter, Rejection, Reply,
};

async fn resolve_topics(keys: TopicKeys, app: Arc<App>) -> Result<impl Reply, Rejection> {
    app.metrics.incr(Metrics::METRIC_HTTP_TOPICS_COUNT);
    if let Some(key) = keys.iter().find(|key| !is_valid_topic_key(key)) {
        app.metrics.incr(Metrics::METRIC_HTTP_REJECTED_COUNT);
        return Err(MalformedRequest::reject(format!("'{key}' is not a valid topic key")));
    }
    Ok(reply::json(&app.relay_service.resolve_topics(&keys)))
}

async fn stream_metadata(requests: ConsumeRequests, app: Arc<App>) -> Result<impl Reply, Rejection> {
    app.metrics.incr(Metrics::METRIC_HTTP_METADATA_COUNT);
    if let Some(msg) = check_consume_requests(&requests, app.settings.relay.max_limit) {
        app.metrics.incr(Metrics::METRIC_HTTP_REJECTED_COUNT);
        return Err(MalformedRequest::reject(msg));
    }

    let (sender, receiver) = mpsc::channel(app.settings.relay.channel_capacity.max(1));
    let chunk_size = app.settings.relay.chunk_size;
    let relay_service = Arc::clone(&app.relay_service);

    task::spawn_blocking(move || {
        let mut writer = ChunkedWriter::new(ChannelSink::new(sender), chunk_size);
        match relay_service.stream_messages(&requests, &mut writer) {
            Ok(_count) => {
                #[cfg(debug_assertions)]
                debug!(
                    "Api: Streamed {_count} messages for {} topics in {} chunks",
                    requests.len(),
                    writer.chunk_count()
                );
            }
            Err(ChunkError::Closed) => {
                info!("Api: Client went away after {} bytes", writer.byte_count());
            }
            Err(err) => {
                warn!("Api: Abandoned metadata response: {err}");
                writer.abort(&err.to_string());
            }
        }
    });

    let mut response = Response::new(Body::wrap_stream(ReceiverStream::new(receiver)));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    Ok(response)
}

async fn shutdown(app: Arc<App>) -> Result<impl Reply, Rejection> {
    app.metrics.incr(Metrics::METRIC_HTTP_SHUTDOWN_COUNT);
    let first = app.shutdown_service.trigger();
    Ok(reply::json(&ShutdownResult {
        accepted: true,
        first,
    }))
}

async fn ping(app: Arc<App>) -> Result<impl Reply, Rejection> {
    app.metrics.incr(Metrics::METRIC_HTTP_PING_COUNT);
    Ok(reply::html("pong"))
}

#[rustfmt::skip]
pub fn routes(app: &Arc<App>) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let limit = app.settings.server.max_request_bytes;

    path!("v1" / "runtime" / "ping")
        .and(get()).and(with_app(app))
        .and_then(ping)
    .or(path!("v1" / "runtime" / "monitor" / "topics")
        .and(post()).and(body::content_length_limit(limit)).and(body::json()).and(with_app(app))
        .and_then(resolve_topics))
    .or(path!("v1" / "runtime" / "metadata")
        .and(post()).and(body::content_length_limit(limit)).and(body::json()).and(with_app(app))
        .and_then(stream_metadata))
    .or(path!("v1" / "runtime" / "shutdown")
        .and(post()).and(with_app(app))
        .and_then(shutdown))
}
