//! Axum server setup and routing

use crate::routes;
use crate::state::MockState;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Path the stream endpoint is mounted on
pub const STREAM_PATH: &str = "/rtsp-stream";

/// Build the router over `state`
pub fn router(state: MockState) -> Router {
    Router::new()
        .route(
            STREAM_PATH,
            get(routes::get_stream)
                .post(routes::start_stream)
                .delete(routes::stop_stream),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serve on `127.0.0.1:port` until Ctrl+C
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    info!("mock ingestion service on http://{}{}", addr, STREAM_PATH);

    serve_listener(listener, MockState::new(), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(
    listener: TcpListener,
    state: MockState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
