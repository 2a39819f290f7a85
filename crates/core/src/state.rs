//! State: one composite plus a named set of composed resources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{XfnError, XfnResult};
use crate::resource::Resource;

/// Observed or desired state of a composite and its composed resources.
///
/// Resource names are caller-chosen, stable across reconciles, and the key
/// the orchestrator diffs on. They are not cluster identities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Always present; an empty composite means "not yet observed".
    #[serde(default)]
    pub composite: Resource,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Resource>,
}

impl State {
    pub fn new(composite: Resource) -> Self {
        Self { composite, resources: BTreeMap::new() }
    }

    /// Add a resource under a new name. An existing name is an error, never
    /// a silent overwrite.
    pub fn insert(&mut self, name: impl Into<String>, resource: Resource) -> XfnResult<()> {
        let name = name.into();
        if self.resources.contains_key(&name) {
            return Err(XfnError::DuplicateResourceName(name));
        }
        self.resources.insert(name, resource);
        Ok(())
    }

    /// Set a resource the caller owns, replacing any previous value.
    /// Returns the replaced resource.
    pub fn set(&mut self, name: impl Into<String>, resource: Resource) -> Option<Resource> {
        self.resources.insert(name.into(), resource)
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> { self.resources.get(name) }

    pub fn contains(&self, name: &str) -> bool { self.resources.contains_key(name) }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.resources.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.resources.len() }

    /// No composite information and no composed resources.
    pub fn is_empty(&self) -> bool { self.composite.is_empty() && self.resources.is_empty() }

    /// Fold a later function's desired state into this one: the later value
    /// wins for every name it carries; names it does not mention are kept.
    /// The composite is replaced only when the later one has a manifest.
    pub fn merge(&mut self, later: &State) {
        if later.composite.manifest.is_some() {
            self.composite = later.composite.clone();
        }
        for (name, r) in &later.resources {
            if self.resources.insert(name.clone(), r.clone()).is_some() {
                debug!(resource = %name, "desired resource overwritten by later function");
            }
        }
    }
}
