//! Axum application assembly and the serve loop.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    response::Response,
    routing::get,
    Router,
};
use http::StatusCode;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as CorsAny, CorsLayer},
};
use tracing::error;

use router::DataRouter;
use terminal::{ExecutionTracker, TerminalHost};

use crate::config::ServerConfig;
use crate::sessions::SessionManager;
use crate::{internal, ws};

/// Explicit context handed to every handler; constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub router: Arc<DataRouter>,
    pub terminal: Arc<TerminalHost>,
    pub tracker: Arc<ExecutionTracker>,
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic message".to_string()
    };
    error!("panic caught in handler: {}", details);

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from("internal server error"))
        .unwrap()
}

/// Public app: data and terminal client endpoints.
pub fn public_app(state: AppState) -> Router {
    Router::new()
        .route("/ws/data", get(ws::data_ws_handler))
        .route("/ws/terminal", get(ws::terminal_ws_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods(CorsAny)
                .allow_headers(CorsAny),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// Internal app: trusted producer and instrumentation endpoints.
pub fn internal_app(state: AppState) -> Router {
    Router::new()
        .route("/internal/scan", get(internal::scan_ws_handler))
        .route(
            "/internal/terminal-events",
            get(internal::terminal_events_ws_handler),
        )
        .with_state(state)
}

pub async fn run(
    state: AppState,
    config: ServerConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let public_addr: SocketAddr = format!(
        "{}:{}",
        config.network.bind_address, config.network.bind_port
    )
    .parse()?;
    let internal_addr: SocketAddr = format!(
        "{}:{}",
        config.network.internal_address, config.network.internal_port
    )
    .parse()?;

    let public_listener = tokio::net::TcpListener::bind(public_addr).await?;
    let internal_listener = tokio::net::TcpListener::bind(internal_addr).await?;
    tracing::info!("listening on {public_addr} (public), {internal_addr} (internal)");

    let internal_server = {
        let app = internal_app(state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(internal_listener, app.into_make_service()).await {
                error!(error = %e, "internal listener failed");
            }
        })
    };

    axum::serve(public_listener, public_app(state).into_make_service())
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        })
        .await?;

    internal_server.abort();
    Ok(())
}
