use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use xfn_api::{FnRunner, SharedRunner};
use xfn_core::{response, Condition, Resource, ResourceSelector, RunFunctionRequest, Severity, State, Status};
use xfn_engine::{Engine, EngineConfig, NoResources, Resolver, RunStatus, Step};
use xfn_store::{snapshot_from_objects, WorldSnapshot};

fn observed() -> State {
    State::new(
        Resource::from_manifest(&json!({"apiVersion": "example.org/v1", "kind": "XR", "metadata": {"name": "xr"}}))
            .unwrap(),
    )
}

fn cm(data: &str) -> Resource {
    Resource::from_manifest(&json!({"apiVersion": "v1", "kind": "ConfigMap", "data": {"v": data}})).unwrap()
}

fn cfg() -> EngineConfig {
    EngineConfig {
        backoff_base: Duration::from_secs(2),
        backoff_max: Duration::from_secs(60),
        warning_poll: Duration::from_secs(15),
        poll: Duration::from_secs(120),
        ..Default::default()
    }
}

fn writer(name: &'static str, resource: &'static str, value: &'static str) -> SharedRunner {
    Arc::new(FnRunner::new(name, move |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.set_resource(resource, cm(value))?;
        b.normal(format!("{name} wrote {resource}"));
        b.build()
    }))
}

#[tokio::test]
async fn later_steps_see_and_override_earlier_desired_state() {
    let saw_a = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&saw_a);
    let second: SharedRunner = Arc::new(FnRunner::new("second", move |req: &RunFunctionRequest| {
        if req.desired_resource("a").is_some() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        let mut b = response::to(req);
        b.set_resource("a", cm("second"))?;
        b.set_resource("b", cm("second"))?;
        b.condition(Condition::new("Ready", Status::True, "Available"));
        b.build()
    }));
    let engine = Engine::new(vec![Step::new(writer("first", "a", "first")), Step::new(second)], Arc::new(NoResources), cfg());

    let out = engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(out.status, RunStatus::Applied);
    assert_eq!(saw_a.load(Ordering::SeqCst), 1);
    assert_eq!(out.desired.len(), 2);
    assert_eq!(out.desired.resource("a").and_then(|r| r.pointer("/data/v")), Some(&json!("second")));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].function, "first");
    assert_eq!(out.condition("Ready").map(|c| c.status), Some(Status::True));
    // Default 60s TTL beats the 120s poll.
    assert_eq!(out.requeue_after, Duration::from_secs(60));
}

#[tokio::test]
async fn fatal_fails_the_run_and_backs_off() {
    let after = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&after);
    let never: SharedRunner = Arc::new(FnRunner::new("never", move |req: &RunFunctionRequest| {
        count.fetch_add(1, Ordering::SeqCst);
        response::to(req).build()
    }));
    let fatal: SharedRunner = Arc::new(FnRunner::new("fatal", |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.normal("one").normal("two").fatal("boom");
        b.build()
    }));
    let engine = Engine::new(
        vec![Step::new(writer("first", "a", "x")), Step::new(fatal), Step::new(never)],
        Arc::new(NoResources),
        cfg(),
    );

    let out = engine.reconcile(observed(), None, 2).await.unwrap();
    assert_eq!(out.status, RunStatus::Failed);
    assert!(!out.is_applied());
    assert_eq!(out.severity, Severity::Fatal);
    assert_eq!(out.requeue_after, Duration::from_secs(8));
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn warnings_shorten_the_poll() {
    let warn: SharedRunner = Arc::new(FnRunner::new("warn", |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.warning("parent missing");
        b.build()
    }));
    let engine = Engine::new(vec![Step::new(warn)], Arc::new(NoResources), cfg());
    let out = engine.reconcile(observed(), None, 0).await.unwrap();
    assert!(out.is_applied());
    assert_eq!(out.severity, Severity::Warning);
    assert_eq!(out.requeue_after, Duration::from_secs(15));
}

#[tokio::test]
async fn unchanged_inputs_hit_the_ttl_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&calls);
    let counted: SharedRunner = Arc::new(FnRunner::new("counted", move |req: &RunFunctionRequest| {
        count.fetch_add(1, Ordering::SeqCst);
        let mut b = response::to(req);
        b.set_resource("a", cm("v"))?;
        b.build()
    }));
    let step = Step::new(counted).with_input(&json!({"replicas": 1})).unwrap();
    let engine = Engine::new(vec![step], Arc::new(NoResources), cfg());

    let first = engine.reconcile(observed(), None, 0).await.unwrap();
    let second = engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.rounds, 1);
    assert_eq!(second.rounds, 0);
    assert_eq!(first.desired, second.desired);
    assert_eq!(engine.cached_responses(), 1);

    // A changed observed state is a different input.
    let mut changed = observed();
    changed.insert("a", cm("observed")).unwrap();
    engine.reconcile(changed, None, 0).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A world that can be swapped between reconciles.
struct Swappable(Mutex<Arc<WorldSnapshot>>);

impl Swappable {
    fn with_tier(tier: &str) -> Self { Self(Mutex::new(tiered(tier))) }

    fn set_tier(&self, tier: &str) { *self.0.lock().unwrap() = tiered(tier); }
}

impl Resolver for Swappable {
    fn resolve(&self, selector: &ResourceSelector) -> Vec<Resource> { self.0.lock().unwrap().select(selector) }
}

fn tiered(tier: &str) -> Arc<WorldSnapshot> {
    snapshot_from_objects(vec![json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": {"name": "parent", "namespace": "default", "uid": "00000000-0000-0000-0000-000000000001"},
        "data": {"tier": tier}
    })])
}

/// Copies the parent's tier into a composed ConfigMap.
fn copy_tier(calls: Arc<AtomicUsize>) -> SharedRunner {
    Arc::new(FnRunner::new("copy-tier", move |req: &RunFunctionRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        let mut b = response::to(req);
        if !req.is_resolved("parent") {
            b.require("parent", ResourceSelector::by_name("v1", "ConfigMap", "parent").in_namespace("default"))?;
            return b.build();
        }
        let tier = req.extra_resource("parent").and_then(|p| p.pointer("/data/tier")).and_then(|v| v.as_str());
        b.set_resource("child", cm(tier.unwrap_or("none")))?;
        b.build()
    }))
}

#[tokio::test]
async fn changed_extra_resources_bypass_the_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let world = Arc::new(Swappable::with_tier("gold"));
    let engine = Engine::new(vec![Step::new(copy_tier(Arc::clone(&calls)))], world.clone(), cfg());
    let tier = |o: &xfn_engine::Outcome| o.desired.resource("child").and_then(|r| r.pointer("/data/v")).cloned();

    let first = engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(tier(&first), Some(json!("gold")));
    assert_eq!(first.rounds, 2);

    // Nothing changed: served from the cache.
    let again = engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(again.rounds, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    world.set_tier("silver");
    let after = engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(tier(&after), Some(json!("silver")));
    assert_eq!(after.rounds, 2);
    assert_eq!(engine.cached_responses(), 1);
}

#[tokio::test]
async fn expired_responses_are_purged_on_reconcile() {
    let short: SharedRunner = Arc::new(FnRunner::new("short", |req: &RunFunctionRequest| {
        let mut b = response::to(req);
        b.set_resource("a", cm("v"))?;
        b.ttl(Duration::from_millis(20));
        b.build()
    }));
    let engine = Engine::new(vec![Step::new(short)], Arc::new(NoResources), cfg());

    engine.reconcile(observed(), None, 0).await.unwrap();
    assert_eq!(engine.cached_responses(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A different observed state never looks up the first entry.
    let mut changed = observed();
    changed.insert("a", cm("observed")).unwrap();
    engine.reconcile(changed, None, 0).await.unwrap();
    assert_eq!(engine.cached_responses(), 1);
}

#[tokio::test]
async fn non_convergence_fails_the_run_with_backoff() {
    let asked = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&asked);
    let greedy: SharedRunner = Arc::new(FnRunner::new("greedy", move |req: &RunFunctionRequest| {
        let n = count.fetch_add(1, Ordering::SeqCst);
        let mut b = response::to(req);
        b.require(format!("more-{n}"), ResourceSelector::by_name("v1", "ConfigMap", "x"))?;
        b.build()
    }));
    let later = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&later);
    let never: SharedRunner = Arc::new(FnRunner::new("never", move |req: &RunFunctionRequest| {
        seen.fetch_add(1, Ordering::SeqCst);
        response::to(req).build()
    }));
    let engine = Engine::new(
        vec![Step::new(greedy), Step::new(never)],
        Arc::new(NoResources),
        EngineConfig { max_rounds: 3, ..cfg() },
    );

    let out = engine.reconcile(observed(), None, 1).await.unwrap();
    assert_eq!(out.status, RunStatus::Failed);
    assert_eq!(out.severity, Severity::Fatal);
    assert_eq!(out.rounds, 3);
    assert_eq!(out.requeue_after, Duration::from_secs(4));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].function, "greedy");
    assert_eq!(out.results[0].result.reason.as_deref(), Some("NonConvergence"));
    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert_eq!(engine.cached_responses(), 0);
}
