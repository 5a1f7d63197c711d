/*
This module provides the REST API that the monitor on the control plane polls.
Every rejection is recovered into an ErrorResponse body so that the monitor can tell
a malformed request apart from a failure on this side.
*/

use crate::App;
use std::{
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    sync::{atomic::Ordering, Arc},
};
use log::info;
use warp::{Filter, Reply};

mod rejections; // Maps rejections onto status codes and error bodies
mod runtime; // Topic resolution, message streaming and shutdown

pub use rejections::MalformedRequest;

/// This warp filter injects the application context so that handlers can access services
fn with_app(app: &Arc<App>) -> impl Filter<Extract = (Arc<App>,), Error = Infallible> + Clone {
    let app = Arc::clone(app);
    warp::any().map(move || Arc::clone(&app))
}

#[rustfmt::skip]
pub fn routes(app: &Arc<App>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    runtime::routes(app)
        .recover(rejections::handle_rejection)
}

/// Binds the listener and returns the address actually bound, which differs from the
/// requested one when port 0 is used. The returned future runs the server until the
/// application's stop signal is set.
pub fn serve(
    app: &Arc<App>,
    addr: SocketAddr,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    let stop_signal = app.stop_signal.clone();

    let stop_future = async move {
        while !stop_signal.load(Ordering::Relaxed) {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    };

    let (addr, server) = warp::serve(routes(app)).try_bind_with_graceful_shutdown(addr, stop_future)?;

    info!("Relay endpoint ready on {addr}");

    Ok((addr, server))
}
