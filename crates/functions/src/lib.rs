//! Reference composition functions.

#![forbid(unsafe_code)]

use std::sync::Arc;

use xfn_api::SharedRunner;

pub mod deployment;
pub mod parent;

pub use deployment::{DeploymentFunction, DeploymentInput};
pub use parent::{ParentInput, ParentLookupFunction};

/// Names accepted by [`by_name`].
pub const NAMES: &[&str] = &[deployment::NAME, parent::NAME];

/// Look up a built-in function by its name.
pub fn by_name(name: &str) -> Option<SharedRunner> {
    match name {
        deployment::NAME => Some(Arc::new(DeploymentFunction)),
        parent::NAME => Some(Arc::new(ParentLookupFunction)),
        _ => None,
    }
}
