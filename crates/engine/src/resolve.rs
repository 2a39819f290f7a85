//! Resolving selectors against whatever holds the live objects.

use std::sync::Arc;

use xfn_core::{Resource, ResourceSelector};
use xfn_store::WorldSnapshot;

pub trait Resolver: Send + Sync {
    /// Every object the selector matches. An empty list is a valid answer.
    fn resolve(&self, selector: &ResourceSelector) -> Vec<Resource>;
}

impl Resolver for WorldSnapshot {
    fn resolve(&self, selector: &ResourceSelector) -> Vec<Resource> { self.select(selector) }
}

impl Resolver for Arc<WorldSnapshot> {
    fn resolve(&self, selector: &ResourceSelector) -> Vec<Resource> { self.select(selector) }
}

/// Resolves nothing; every selector comes back empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl Resolver for NoResources {
    fn resolve(&self, _selector: &ResourceSelector) -> Vec<Resource> { Vec::new() }
}
