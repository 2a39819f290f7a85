use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use xfn_api::FnRunner;
use xfn_core::{response, Resource, ResourceSelector, RunFunctionRequest, Severity, XfnResult, RunFunctionResponse};
use xfn_engine::{negotiate, EngineConfig, EngineError, NoResources};
use xfn_store::snapshot_from_objects;

fn parent_lookup(req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> {
    let mut b = response::to(req);
    if !req.is_resolved("parent") {
        b.require("parent", ResourceSelector::by_name("v1", "ConfigMap", "parent").in_namespace("default"))?;
        return b.build();
    }
    match req.extra_resource("parent") {
        Some(p) => {
            let name = format!("child-{}", p.name().unwrap_or_default());
            b.set_resource(name, Resource::from_manifest(&json!({"apiVersion": "v1", "kind": "ConfigMap"}))?)?;
        }
        None => {
            b.warning("parent not found");
        }
    }
    b.build()
}

fn world() -> Arc<xfn_store::WorldSnapshot> {
    snapshot_from_objects(vec![json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": {"name": "parent", "namespace": "default"}
    })])
}

#[tokio::test]
async fn converges_once_the_parent_is_resolved() {
    let f = FnRunner::new("parent-lookup", parent_lookup);
    let req = RunFunctionRequest::new("abc");
    let n = negotiate(&f, req, &world(), &EngineConfig::default()).await.unwrap();
    assert_eq!(n.rounds, 2);
    assert!(!n.stalled);
    assert_eq!(n.response.tag(), "abc");
    assert!(n.response.is_complete());
    assert!(n.response.desired.contains("child-parent"));
    assert_eq!(n.response.severity(), Severity::Normal);
    // The final call saw exactly one resolved parent.
    assert!(n.resolutions.requirements.get("parent").is_some());
    assert_eq!(n.resolutions.resources.get("parent").map(Vec::len), Some(1));
    assert!(n.resolutions.still_hold(&world()));
    assert!(!n.resolutions.still_hold(&NoResources));
}

#[tokio::test]
async fn empty_resolution_is_terminal() {
    let f = FnRunner::new("parent-lookup", parent_lookup);
    let n = negotiate(&f, RunFunctionRequest::new("abc"), &NoResources, &EngineConfig::default()).await.unwrap();
    assert_eq!(n.rounds, 2);
    assert_eq!(n.response.severity(), Severity::Warning);
    assert!(n.response.desired.is_empty());
}

#[tokio::test]
async fn every_round_reuses_the_tag_and_sends_only_current_resolutions() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let f = FnRunner::new("two-step", move |req: &RunFunctionRequest| {
        let keys: Vec<String> = req.extra_resources.keys().cloned().collect();
        log.lock().unwrap().push((req.tag().to_string(), keys));
        let mut b = response::to(req);
        if !req.is_resolved("first") && !req.is_resolved("second") {
            b.require("first", ResourceSelector::by_name("v1", "ConfigMap", "a"))?;
        } else if req.is_resolved("first") {
            b.require("second", ResourceSelector::by_name("v1", "ConfigMap", "b"))?;
        }
        b.build()
    });
    let n = negotiate(&f, RunFunctionRequest::new("t-1"), &NoResources, &EngineConfig::default()).await.unwrap();
    assert_eq!(n.rounds, 3);
    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|(tag, _)| tag == "t-1"));
    assert_eq!(seen[0].1, Vec::<String>::new());
    assert_eq!(seen[1].1, vec!["first".to_string()]);
    assert_eq!(seen[2].1, vec!["second".to_string()]);
}

#[tokio::test]
async fn repeated_requirements_stop_the_loop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let f = FnRunner::new("stubborn", move |req: &RunFunctionRequest| {
        c.fetch_add(1, Ordering::SeqCst);
        let mut b = response::to(req);
        b.require("parent", ResourceSelector::by_name("v1", "ConfigMap", "parent"))?;
        b.build()
    });
    let n = negotiate(&f, RunFunctionRequest::new("t"), &NoResources, &EngineConfig::default()).await.unwrap();
    assert!(n.stalled);
    assert_eq!(n.rounds, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!n.response.is_complete());
}

#[tokio::test]
async fn round_cap_is_enforced() {
    let calls = AtomicUsize::new(0);
    let f = FnRunner::new("greedy", move |req: &RunFunctionRequest| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let mut b = response::to(req);
        b.require(format!("r{n}"), ResourceSelector::by_labels("v1", "Pod", [("app", "web")]))?;
        b.build()
    });
    let cfg = EngineConfig { max_rounds: 3, ..Default::default() };
    let err = negotiate(&f, RunFunctionRequest::new("t"), &NoResources, &cfg).await.unwrap_err();
    assert_eq!(err, EngineError::NonConvergence { function: "greedy".into(), rounds: 3 });
}

#[tokio::test]
async fn fatal_ends_negotiation_immediately() {
    let f = FnRunner::new("broken", |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.fatal("cannot continue");
        b.require("parent", ResourceSelector::by_name("v1", "ConfigMap", "parent"))?;
        b.build()
    });
    let n = negotiate(&f, RunFunctionRequest::new("t"), &world(), &EngineConfig::default()).await.unwrap();
    assert_eq!(n.rounds, 1);
    assert!(n.response.is_fatal());
}
