//! xfn store: in-RAM snapshot of live objects, used by the reference
//! orchestrator to resolve extra-resource selectors.
//!
//! Deltas keyed by UID are applied by a [`WorldBuilder`], which freezes them
//! into immutable, sorted [`WorldSnapshot`]s. A snapshot is shared behind an
//! `Arc` and never changes; a newer world is a new snapshot.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use kube::core::GroupVersionKind;
use metrics::gauge;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};
use uuid::Uuid;
use xfn_core::{Resource, ResourceSelector};

pub type Uid = [u8; 16];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeltaKind {
    Applied,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub uid: Uid,
    pub kind: DeltaKind,
    /// Raw object as the cluster returned it.
    pub raw: serde_json::Value,
}

impl Delta {
    /// An `Applied` delta keyed by `metadata.uid`. Objects without a parseable
    /// UID (hand-written fixtures) get a random one.
    pub fn applied(raw: serde_json::Value) -> Self {
        let uid = raw
            .pointer("/metadata/uid")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(|| {
                debug!("object has no metadata.uid; assigning a random one");
                Uuid::new_v4()
            });
        Self { uid: *uid.as_bytes(), kind: DeltaKind::Applied, raw }
    }

    pub fn deleted(uid: Uid) -> Self {
        Self { uid, kind: DeltaKind::Deleted, raw: serde_json::Value::Null }
    }
}

/// `group/version/kind`, or `version/kind` for the core group.
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

/// Split an `apiVersion` plus kind into a GVK.
pub fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    GroupVersionKind { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
}

/// One live object with its identity pulled out for selection.
#[derive(Debug, Clone)]
pub struct LiveObject {
    pub uid: Uid,
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub name: String,
    pub labels: SmallVec<[(String, String); 8]>,
    pub resource: Resource,
}

impl LiveObject {
    /// Extract identity from a raw object; objects without apiVersion, kind
    /// or name cannot be selected and are refused.
    pub fn from_raw(uid: Uid, raw: serde_json::Value) -> Result<Self> {
        let resource = Resource::from_manifest(&raw).map_err(|e| anyhow!("{}", e))?;
        let name = resource.name().ok_or_else(|| anyhow!("object missing metadata.name"))?.to_string();
        let gvk = parse_gvk(resource.api_version().unwrap_or_default(), resource.kind().unwrap_or_default());
        let namespace = resource.namespace().map(|s| s.to_string());
        let labels = resource.labels().into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Ok(Self { uid, gvk, namespace, name, labels, resource })
    }
}

/// Immutable view of every live object at one epoch.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub epoch: u64,
    /// Sorted by (gvk, namespace, name).
    pub items: Vec<LiveObject>,
}

impl WorldSnapshot {
    /// Objects matching `selector`, in snapshot order. Name selectors yield
    /// zero or one object per namespace; label selectors any number.
    pub fn select(&self, selector: &ResourceSelector) -> Vec<Resource> {
        let want = gvk_key(&parse_gvk(&selector.api_version, &selector.kind));
        self.items
            .iter()
            .filter(|o| gvk_key(&o.gvk) == want)
            .filter(|o| selector.matches(&o.resource))
            .map(|o| o.resource.clone())
            .collect()
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// Builds [`WorldSnapshot`]s from deltas.
#[derive(Default)]
pub struct WorldBuilder {
    epoch: u64,
    items: FxHashMap<Uid, LiveObject>,
}

impl WorldBuilder {
    pub fn new() -> Self { Self::default() }

    /// Apply a batch of deltas in order and advance the epoch. A later delta
    /// for the same UID replaces an earlier one.
    pub fn apply(&mut self, batch: Vec<Delta>) {
        for d in batch {
            match d.kind {
                DeltaKind::Applied => match LiveObject::from_raw(d.uid, d.raw) {
                    Ok(o) => {
                        self.items.insert(d.uid, o);
                    }
                    Err(e) => warn!(error = %e, "skipping unselectable object"),
                },
                DeltaKind::Deleted => {
                    self.items.remove(&d.uid);
                }
            }
        }
        self.epoch = self.epoch.saturating_add(1);
    }

    pub fn freeze(&self) -> Arc<WorldSnapshot> {
        let mut items: Vec<LiveObject> = self.items.values().cloned().collect();
        items.sort_by(|a, b| {
            gvk_key(&a.gvk)
                .cmp(&gvk_key(&b.gvk))
                .then_with(|| a.namespace.cmp(&b.namespace))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        gauge!("store_objects", items.len() as f64);
        gauge!("store_epoch", self.epoch as f64);
        Arc::new(WorldSnapshot { epoch: self.epoch, items })
    }
}

/// Build a snapshot in one go from a list of raw objects (fixtures, render).
pub fn snapshot_from_objects(objects: Vec<serde_json::Value>) -> Arc<WorldSnapshot> {
    let mut wb = WorldBuilder::new();
    wb.apply(objects.into_iter().map(Delta::applied).collect());
    wb.freeze()
}
