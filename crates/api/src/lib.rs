//! xfn API: the `RunFunction` contract.
//!
//! Functions implement [`FunctionRunner`]. Callers (the HTTP runtime, the
//! reference engine, `xfnctl render`) go through [`run_guarded`], which turns
//! every error and protocol violation into a FATAL response so the
//! orchestrator always receives a well-formed answer carrying its tag.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};
use xfn_core::codec::{self, Format};
use xfn_core::{response, RunFunctionRequest, RunFunctionResponse, Severity, XfnError, XfnResult};

/// One composition function.
#[async_trait::async_trait]
pub trait FunctionRunner: Send + Sync {
    /// Stable name, used in logs, metrics and cache keys.
    fn name(&self) -> &str;

    /// Answer one request. Must be deterministic over the request's
    /// contents and must not touch anything outside it.
    async fn run_function(&self, req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse>;
}

pub type SharedRunner = Arc<dyn FunctionRunner>;

/// Transport-level failures: the body was not a request at all, or the
/// server broke. Everything else travels as a FATAL result.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    #[error("decode: {0}")]
    Decode(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Decode(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Decode(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<XfnError> for ApiError {
    fn from(e: XfnError) -> Self {
        match e {
            XfnError::Codec(m) => ApiError::Decode(m),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON error body returned alongside a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(e: &ApiError) -> Self { Self { error: e.to_string(), code: e.code().to_string() } }
}

/// Decode a request body; anything that is not a request is a [`ApiError::Decode`].
pub fn decode_request(bytes: &[u8], format: Format) -> ApiResult<RunFunctionRequest> {
    codec::decode(bytes, format).map_err(ApiError::from)
}

/// Run a function and always come back with a response that answers `req`.
///
/// - a returned error becomes [`response::fatal`] with the error's reason;
/// - a response with the wrong tag, or with a TTL alongside pending
///   requirements, is replaced by a FATAL one naming the violation.
pub async fn run_guarded(runner: &dyn FunctionRunner, req: &RunFunctionRequest) -> RunFunctionResponse {
    let span = info_span!("run_function", function = runner.name(), tag = %req.tag());
    async move {
        let t0 = Instant::now();
        let rsp = match runner.run_function(req).await {
            Ok(rsp) => match rsp.check_against(req) {
                Ok(()) => rsp,
                Err(e) => {
                    warn!(error = %e, "function broke the protocol; answering FATAL");
                    counter!("xfn_protocol_violations_total", 1u64);
                    response::fatal(req, &e)
                }
            },
            Err(e) => {
                debug!(error = %e, reason = e.reason(), "function returned an error");
                response::fatal(req, &e)
            }
        };
        let severity = rsp.severity();
        histogram!("xfn_function_call_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("xfn_function_calls_total", 1u64);
        if severity == Severity::Fatal {
            counter!("xfn_function_fatal_total", 1u64);
        }
        debug!(severity = %severity, results = rsp.results.len(), pending = rsp.requirements.len(), "function answered");
        rsp
    }
    .instrument(span)
    .await
}

/// Adapter turning a plain closure into a [`FunctionRunner`]. Handy for
/// tests and for one-off functions.
pub struct FnRunner<F> {
    name: String,
    f: F,
}

impl<F> FnRunner<F>
where
    F: Fn(&RunFunctionRequest) -> XfnResult<RunFunctionResponse> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self { Self { name: name.into(), f } }
}

#[async_trait::async_trait]
impl<F> FunctionRunner for FnRunner<F>
where
    F: Fn(&RunFunctionRequest) -> XfnResult<RunFunctionResponse> + Send + Sync,
{
    fn name(&self) -> &str { &self.name }

    async fn run_function(&self, req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> { (self.f)(req) }
}
