use std::convert::Infallible;
use async_stream::stream;
use tokio::sync::broadcast::{Sender, error::RecvError};
use tokio_util::sync::CancellationToken;
use warp::{Filter, Rejection, Reply, sse::{Event, reply, keep_alive}};
use log::{error, info, warn};

/// `GET /readings` as Server-Sent Events plus `GET /health`.
pub fn routes(
    tx: Sender<String>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::get().and(warp::path!("health")).map(|| "OK");

    // GET /readings → SSE
    let readings = warp::get()
        .and(warp::path!("readings"))
        .map(move || {
            // subscribe inside the closure
            let mut rx = tx.subscribe();
            // build a fresh stream for each client
            let event_stream = stream! {
                loop {
                    match rx.recv().await {
                        Ok(payload) => {
                            yield Ok::<_, Infallible>(Event::default().data(payload));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("feed client lagged, dropped {} payloads", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            // reply sets up text/event-stream headers for you
            reply(keep_alive().stream(event_stream))
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["OPTIONS", "GET"])
        .allow_headers(vec!["accept", "last-event-id", "origin"]);

    health.or(readings).with(cors)
}

/// Serve the feed on `0.0.0.0:port` until `shutdown` is cancelled.
pub async fn serve_feed(tx: Sender<String>, port: u16, shutdown: CancellationToken) {
    let bound = warp::serve(routes(tx))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            shutdown.cancelled().await;
        });
    match bound {
        Ok((addr, server)) => {
            info!("Feed  : {}/readings (SSE), {}/health", addr, addr);
            server.await;
        }
        Err(e) => error!("Feed server failed to bind port {}: {}", port, e),
    }
}
