//! xfn runtime: serve a [`FunctionRunner`](xfn_api::FunctionRunner) over HTTP.
//!
//! Routes:
//! - `POST /apiextensions.fn.proto.v1.FunctionRunnerService/RunFunction`:
//!   JSON request in, JSON response out. Function failures come back as
//!   FATAL results with status 200; only undecodable bodies are 400.
//! - `GET /services`: the served RPC service names.
//! - `GET /healthz`.

#![forbid(unsafe_code)]

pub mod logging;

use anyhow::{bail, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use xfn_api::{decode_request, run_guarded, ApiError, ErrorBody, SharedRunner};
use xfn_core::codec::Format;
use xfn_core::RunFunctionResponse;

pub const SERVICE_NAME: &str = "apiextensions.fn.proto.v1.FunctionRunnerService";

/// Every service a function server answers for.
pub const SERVICE_NAMES: &[&str] = &[SERVICE_NAME];

pub const RUN_FUNCTION_PATH: &str = "/apiextensions.fn.proto.v1.FunctionRunnerService/RunFunction";

/// [`ApiError`] as an HTTP response.
struct HttpError(ApiError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Services {
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
    pub ok: bool,
    pub function: String,
}

async fn run_function(State(runner): State<SharedRunner>, body: Bytes) -> Result<Json<RunFunctionResponse>, HttpError> {
    let req = decode_request(&body, Format::Json).map_err(|e| {
        warn!(error = %e, bytes = body.len(), "rejecting undecodable request");
        HttpError(e)
    })?;
    Ok(Json(run_guarded(runner.as_ref(), &req).await))
}

async fn services() -> Json<Services> {
    Json(Services { services: SERVICE_NAMES.iter().map(|s| s.to_string()).collect() })
}

async fn healthz(State(runner): State<SharedRunner>) -> Json<Health> {
    Json(Health { ok: true, function: runner.name().to_string() })
}

/// The full router for `runner`.
pub fn router(runner: SharedRunner) -> Router {
    Router::new()
        .route(RUN_FUNCTION_PATH, post(run_function))
        .route("/services", get(services))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(runner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub address: String,
    /// Serve plaintext. Required: TLS is expected to be terminated in front
    /// of the server.
    pub insecure: bool,
}

impl Default for ServeOptions {
    fn default() -> Self { Self { address: "0.0.0.0:9443".to_string(), insecure: false } }
}

/// Serve `runner` until Ctrl-C or SIGTERM.
pub async fn serve(runner: SharedRunner, opts: ServeOptions) -> Result<()> {
    if !opts.insecure {
        bail!("no TLS configured; pass --insecure to serve plaintext behind a TLS-terminating proxy");
    }
    let listener = tokio::net::TcpListener::bind(&opts.address)
        .await
        .with_context(|| format!("binding {}", opts.address))?;
    let addr = listener.local_addr()?;
    info!(%addr, function = runner.name(), "serving function");
    axum::serve(listener, router(runner)).with_graceful_shutdown(shutdown_signal()).await?;
    info!("function server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let term = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }
    info!("shutdown signal received");
}
