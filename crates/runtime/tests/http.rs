use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use xfn_api::{FnRunner, SharedRunner};
use xfn_core::{response, RunFunctionRequest, RunFunctionResponse, Severity, XfnError};
use xfn_runtime::{router, serve, ServeOptions, Services, RUN_FUNCTION_PATH, SERVICE_NAME};

fn echo() -> SharedRunner {
    Arc::new(FnRunner::new("echo", |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.normal("hello");
        b.build()
    }))
}

fn failing() -> SharedRunner {
    Arc::new(FnRunner::new("failing", |_req: &RunFunctionRequest| Err(XfnError::InvalidInput("nope".into()))))
}

async fn post(runner: SharedRunner, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
    let req = Request::post(RUN_FUNCTION_PATH).header("content-type", "application/json").body(body.into()).unwrap();
    let rsp = router(runner).oneshot(req).await.unwrap();
    let status = rsp.status();
    let bytes = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn run_function_echoes_the_tag() {
    let body = serde_json::to_vec(&json!({"meta": {"tag": "abc"}, "input": {"replicas": 3}})).unwrap();
    let (status, bytes) = post(echo(), body).await;
    assert_eq!(status, StatusCode::OK);
    let rsp: RunFunctionResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(rsp.tag(), "abc");
    assert_eq!(rsp.severity(), Severity::Normal);
    assert_eq!(rsp.results[0].message, "hello");
}

#[tokio::test]
async fn function_errors_travel_as_fatal_results() {
    let (status, bytes) = post(failing(), r#"{"meta":{"tag":"t-9"}}"#).await;
    assert_eq!(status, StatusCode::OK);
    let rsp: RunFunctionResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(rsp.tag(), "t-9");
    assert!(rsp.is_fatal());
}

#[tokio::test]
async fn garbage_is_a_bad_request() {
    let (status, bytes) = post(echo(), "{definitely not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], json!("bad_request"));

    // Unknown enum values are a decode failure too.
    let (status, _) = post(echo(), r#"{"observed":{"composite":{"ready":"READY_MAYBE"}}}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn services_and_health() {
    let app = router(echo());
    let rsp = app.clone().oneshot(Request::get("/services").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(rsp.status(), StatusCode::OK);
    let services: Services = serde_json::from_slice(&to_bytes(rsp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(services.services, vec![SERVICE_NAME.to_string()]);

    let rsp = app.oneshot(Request::get("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(rsp.status(), StatusCode::OK);
}

#[tokio::test]
async fn serve_refuses_without_insecure() {
    let err = serve(echo(), ServeOptions { address: "127.0.0.1:0".into(), insecure: false }).await.unwrap_err();
    assert!(err.to_string().contains("--insecure"));
}
