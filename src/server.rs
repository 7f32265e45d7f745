//! HTTP front end: routes, per-request blocking workers and the serve loop.

use crate::camera::Camera;
use crate::config::Config;
use crate::error::{ServerError, StreamError};
use crate::handlers::{Export, NO_QR, Pipeline};
use crate::network;
use crate::recognizer::Recognizer;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures_util::stream;
use log::{error, info, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Every registered path
pub const ROUTES: [&str; 5] = ["/qr", "/qr_stream", "/preset_qr", "/pgm", "/preset_pgm"];

const TEXT_PLAIN: &str = "text/plain";
const GRAYMAP: &str = "image/x-portable-graymap";
const ATTACHMENT: &str = "attachment; filename=\"image.pgm\"";

type Shared<C, R> = State<Arc<Pipeline<C, R>>>;

/// Build the router over a shared pipeline. Unknown paths get 404.
pub fn router<C, R>(pipeline: Arc<Pipeline<C, R>>) -> Router
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    Router::new()
        .route("/qr", get(qr::<C, R>))
        .route("/qr_stream", get(qr_stream::<C, R>))
        .route("/preset_qr", get(preset_qr::<C, R>))
        .route("/pgm", get(pgm::<C, R>))
        .route("/preset_pgm", get(preset_pgm::<C, R>))
        .fallback(not_found)
        .with_state(pipeline)
}

/// Serve until ctrl-c. A listener that fails with an I/O error is dropped
/// and the address bound again.
pub async fn run<C, R>(config: &Config, pipeline: Arc<Pipeline<C, R>>) -> Result<(), ServerError>
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    let app = router(pipeline);
    loop {
        let listener = network::bind_with_retry(config.bind_addr, config.reconnect_delay).await;
        log_routes(listener.local_addr()?);

        match axum::serve(listener, app.clone())
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            Ok(()) => {
                info!("Server stopped");
                return Ok(());
            }
            Err(err) => warn!("Server stopped: {}. Binding again", err),
        }
    }
}

/// Log every route against the address it is reachable on.
pub fn log_routes(addr: SocketAddr) {
    for route in ROUTES {
        info!("Registered http://{}{}", addr, route);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn qr<C, R>(State(pipeline): Shared<C, R>) -> Response
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    match tokio::task::spawn_blocking(move || pipeline.capture()).await {
        Ok(Ok(body)) => text(StatusCode::OK, body),
        Ok(Err(err)) => {
            error!("Camera capture failed: {}", err);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n"))
        }
        Err(err) => worker_failed(err),
    }
}

async fn qr_stream<C, R>(State(pipeline): Shared<C, R>) -> Response
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    let cancel = CancellationToken::new();
    // cancels the worker if the client goes away and this future is dropped
    let _on_disconnect = cancel.clone().drop_guard();

    let worker = cancel.clone();
    match tokio::task::spawn_blocking(move || pipeline.stream(&worker)).await {
        Ok(Ok(body)) => text(StatusCode::OK, body),
        Ok(Err(StreamError::Camera(err))) => {
            error!("Camera capture failed: {}", err);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n"))
        }
        Ok(Err(err)) => {
            warn!("{}", err);
            text(StatusCode::SERVICE_UNAVAILABLE, NO_QR.to_string())
        }
        Err(err) => worker_failed(err),
    }
}

async fn preset_qr<C, R>(State(pipeline): Shared<C, R>) -> Response
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    match tokio::task::spawn_blocking(move || pipeline.capture_preset()).await {
        Ok(body) => text(StatusCode::OK, body),
        Err(err) => worker_failed(err),
    }
}

async fn pgm<C, R>(State(pipeline): Shared<C, R>) -> Response
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    match tokio::task::spawn_blocking(move || pipeline.export_frame()).await {
        Ok(Ok(export)) => graymap(export),
        Ok(Err(err)) => {
            error!("Camera capture failed: {}", err);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n"))
        }
        Err(err) => worker_failed(err),
    }
}

async fn preset_pgm<C, R>(State(pipeline): Shared<C, R>) -> Response
where
    C: Camera + 'static,
    R: Recognizer + 'static,
{
    match pipeline.export_preset() {
        Ok(export) => graymap(export),
        Err(err) => {
            error!("Reference image unreadable: {}", err);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n"))
        }
    }
}

async fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Header and pixels as two body chunks
fn graymap(export: Export) -> Response {
    let chunks = [
        Ok::<_, Infallible>(Bytes::from(export.header)),
        Ok(Bytes::from(export.pixels)),
    ];
    (
        [
            (header::CONTENT_TYPE, GRAYMAP),
            (header::CONTENT_DISPOSITION, ATTACHMENT),
        ],
        Body::from_stream(stream::iter(chunks)),
    )
        .into_response()
}

fn worker_failed(err: tokio::task::JoinError) -> Response {
    error!("Request worker failed: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
