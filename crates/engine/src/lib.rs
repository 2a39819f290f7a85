//! xfn engine: a small reference orchestrator.
//!
//! It plays the caller's side of the protocol: builds requests, negotiates
//! extra resources against a [`Resolver`], honours response TTLs through a
//! [`ResponseCache`], merges desired state across a pipeline of functions and
//! decides when to requeue.

#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod negotiate;
pub mod pipeline;
pub mod resolve;

pub use cache::{fingerprint, ResponseCache};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use negotiate::{negotiate, resolve_requirements, Negotiated, Resolutions};
pub use pipeline::{Engine, Outcome, RunStatus, Step, StepResult};
pub use resolve::{NoResources, Resolver};
