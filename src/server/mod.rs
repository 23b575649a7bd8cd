//! The four speed test endpoints, served with axum.
//!
//! Every response is marked uncacheable: a cache anywhere on the path
//! would silently invalidate every measurement taken through it.

pub mod handlers;
pub mod payload;

use crate::errors::{to_speed_test_error, SpeedTestError};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{CACHE_CONTROL, PRAGMA};
use axum::http::HeaderValue;
use axum::middleware::map_response;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::future::Future;
use tokio::net::TcpListener;

/// Default bind address of `serve`.
pub static DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Create the speed test router.
pub fn router() -> Router {
    Router::new()
        .route("/api/speed/ping", get(handlers::ping))
        .route("/api/speed/download", get(handlers::download))
        .route(
            "/api/speed/upload",
            // The handler enforces its own cap while streaming.
            post(handlers::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/speed/server", get(handlers::server_info))
        .layer(map_response(no_store))
}

async fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();

    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    response
}

pub async fn bind(addr: &str) -> Result<TcpListener, SpeedTestError> {
    TcpListener::bind(addr).await.map_err(|e| {
        SpeedTestError::server(format!("cannot bind {}: {}", addr, e))
            .with_suggestion("Choose a free address with --bind.")
            .with_source(e)
    })
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<(), SpeedTestError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Serving speed test endpoints on http://{}", addr);
    }

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| to_speed_test_error(Box::new(e), "server stopped"))
}
