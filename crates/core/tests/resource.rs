#![forbid(unsafe_code)]

use chrono::{TimeZone, Utc};
use serde_json::json;
use xfn_core::{Ready, Resource, State, Status, XfnError};

#[test]
fn builder_accepts_manifest_with_identity() {
    let r = Resource::builder()
        .manifest(json!({"apiVersion": "example.org/v1", "kind": "XR"}))
        .ready(Ready::True)
        .build()
        .unwrap();
    assert_eq!(r.api_version(), Some("example.org/v1"));
    assert_eq!(r.kind(), Some("XR"));
    assert_eq!(r.ready, Ready::True);
}

#[test]
fn builder_rejects_missing_identity_fields() {
    let err = Resource::builder().manifest(json!({"kind": "XR"})).build().unwrap_err();
    assert!(matches!(err, XfnError::MalformedResource(_)), "{err}");

    let err = Resource::builder().manifest(json!({"apiVersion": "", "kind": "XR"})).build().unwrap_err();
    assert!(matches!(err, XfnError::MalformedResource(_)), "{err}");

    let err = Resource::builder().manifest(json!(["not", "an", "object"])).build().unwrap_err();
    assert!(matches!(err, XfnError::MalformedResource(_)), "{err}");
}

#[test]
fn builder_rejects_empty_resource() {
    assert_eq!(Resource::builder().build().unwrap_err(), XfnError::EmptyResource);
    // Connection details alone are meaningful.
    let r = Resource::builder().connection_detail("password", "hunter2").build().unwrap();
    assert_eq!(r.connection_details.unwrap()["password"], b"hunter2".to_vec());
    // So is readiness alone.
    assert!(Resource::builder().ready(Ready::False).build().is_ok());
}

#[test]
fn update_overwrites_top_level_fields() {
    let mut r = Resource::from_manifest(&json!({"apiVersion": "example.org", "kind": "Resource"})).unwrap();
    r.update(&json!({"metadata": {"name": "cool"}})).unwrap();
    r.update(&json!({"kind": "Other"})).unwrap();
    assert_eq!(r.name(), Some("cool"));
    assert_eq!(r.kind(), Some("Other"));
    assert_eq!(r.api_version(), Some("example.org"));

    let mut empty = Resource::default();
    empty.update(&json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
    assert_eq!(empty.kind(), Some("ConfigMap"));
    assert!(empty.update(&"scalar").is_err());
}

#[test]
fn condition_lookup() {
    let none = Resource::from_manifest(&json!({"apiVersion": "v1", "kind": "X"})).unwrap();
    assert_eq!(none.condition("Ready").status, Status::Unknown);

    let other = Resource::from_manifest(&json!({
        "apiVersion": "v1", "kind": "X",
        "status": {"conditions": [{"type": "Cool", "status": "True"}]}
    }))
    .unwrap();
    let c = other.condition("Ready");
    assert_eq!(c.status, Status::Unknown);
    assert_eq!(c.typ, "Ready");

    let full = Resource::from_manifest(&json!({
        "apiVersion": "v1", "kind": "X",
        "status": {"conditions": [{
            "type": "Ready",
            "status": "True",
            "reason": "Cool",
            "message": "This condition is very cool",
            "lastTransitionTime": "2023-10-02T16:30:00Z"
        }]}
    }))
    .unwrap();
    let c = full.condition("Ready");
    assert_eq!(c.status, Status::True);
    assert_eq!(c.reason.as_deref(), Some("Cool"));
    assert_eq!(c.message.as_deref(), Some("This condition is very cool"));
    assert_eq!(c.last_transition_time, Some(Utc.with_ymd_and_hms(2023, 10, 2, 16, 30, 0).unwrap()));
}

#[test]
fn labels_and_pointer() {
    let r = Resource::from_manifest(&json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": {"name": "a", "namespace": "ns", "labels": {"app": "web", "n": 1}},
        "spec": {"ports": [{"port": 80}]}
    }))
    .unwrap();
    let labels = r.labels();
    assert_eq!(labels.get("app"), Some(&"web"));
    assert!(!labels.contains_key("n"));
    assert_eq!(r.namespace(), Some("ns"));
    assert_eq!(r.pointer("/spec/ports/0/port"), Some(&json!(80)));
    assert_eq!(r.pointer("/spec/ports/1/port"), None);
    assert_eq!(r.pointer("spec"), None);
}

#[test]
fn state_rejects_duplicate_names() {
    let mut s = State::default();
    let a = Resource::from_manifest(&json!({"apiVersion": "v1", "kind": "A"})).unwrap();
    let b = Resource::from_manifest(&json!({"apiVersion": "v1", "kind": "B"})).unwrap();
    s.insert("thing", a.clone()).unwrap();
    let err = s.insert("thing", b.clone()).unwrap_err();
    assert_eq!(err, XfnError::DuplicateResourceName("thing".into()));
    // The original value survives.
    assert_eq!(s.resource("thing"), Some(&a));
    // Explicit overwrite is a separate operation.
    assert_eq!(s.set("thing", b.clone()), Some(a));
    assert_eq!(s.resource("thing"), Some(&b));
}

#[test]
fn state_merge_is_last_writer_per_name() {
    let r = |kind: &str| Resource::from_manifest(&json!({"apiVersion": "v1", "kind": kind})).unwrap();
    let mut running = State::new(r("XR"));
    running.insert("a", r("A1")).unwrap();
    running.insert("b", r("B1")).unwrap();

    let mut later = State::default();
    later.insert("b", r("B2")).unwrap();
    later.insert("c", r("C1")).unwrap();
    running.merge(&later);

    assert_eq!(running.composite.kind(), Some("XR"));
    assert_eq!(running.resource("a").and_then(Resource::kind), Some("A1"));
    assert_eq!(running.resource("b").and_then(Resource::kind), Some("B2"));
    assert_eq!(running.resource("c").and_then(Resource::kind), Some("C1"));
    assert_eq!(running.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}
