//! Driving one function through the extra-resources negotiation.
//!
//! Each round calls the function, resolves whatever it asked for and calls
//! it again with the same tag and the resolutions attached. The function is
//! pure, so suspension is just "not calling it yet" and the loop needs no
//! state beyond the previous round's requirements.

use std::collections::BTreeMap;

use metrics::{counter, histogram};
use tracing::{debug, info};
use xfn_api::{run_guarded, FunctionRunner};
use xfn_core::{Requirements, Resource, RunFunctionRequest, RunFunctionResponse, WATCHED_RESOURCE_REQUIREMENT};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::resolve::Resolver;

/// The requirements answered in the last call of a negotiation, and what
/// they resolved to. Empty when the function never asked for anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolutions {
    pub requirements: Requirements,
    pub resources: BTreeMap<String, Vec<Resource>>,
}

impl Resolutions {
    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }

    /// Whether `resolver` still resolves the same requirements to the same
    /// objects.
    pub fn still_hold(&self, resolver: &dyn Resolver) -> bool {
        self.is_empty() || resolve_requirements(&self.requirements, resolver) == self.resources
    }
}

/// Final answer of a negotiation.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub response: RunFunctionResponse,
    /// Calls made, including the first.
    pub rounds: u32,
    /// True when the loop stopped because the function repeated the
    /// previous round's requirements instead of clearing them.
    pub stalled: bool,
    /// Extra resources the final call was made with.
    pub resolutions: Resolutions,
}

/// Resolve every requirement against `resolver`.
pub fn resolve_requirements(reqs: &Requirements, resolver: &dyn Resolver) -> BTreeMap<String, Vec<Resource>> {
    reqs.iter().map(|(name, sel)| (name.to_string(), resolver.resolve(sel))).collect()
}

/// Run `runner` until its requirements are empty, repeat themselves, or the
/// round cap in `cfg` is hit. A FATAL response ends the loop immediately.
pub async fn negotiate(
    runner: &dyn FunctionRunner,
    req: RunFunctionRequest,
    resolver: &dyn Resolver,
    cfg: &EngineConfig,
) -> EngineResult<Negotiated> {
    let watched = req.extra_resources.get(WATCHED_RESOURCE_REQUIREMENT).cloned();
    let mut req = req;
    let mut prev: Option<Requirements> = None;
    let mut resolutions = Resolutions::default();
    let mut round = 0u32;
    loop {
        round += 1;
        let rsp = run_guarded(runner, &req).await;
        counter!("xfn_negotiation_rounds_total", 1u64);
        if rsp.is_fatal() || rsp.is_complete() {
            histogram!("xfn_negotiation_rounds", round as f64);
            debug!(function = runner.name(), tag = %req.tag(), round, fatal = rsp.is_fatal(), "negotiation finished");
            return Ok(Negotiated { response: rsp, rounds: round, stalled: false, resolutions });
        }
        if prev.as_ref() == Some(&rsp.requirements) {
            histogram!("xfn_negotiation_rounds", round as f64);
            info!(function = runner.name(), tag = %req.tag(), round, "requirements repeated; stopping negotiation");
            return Ok(Negotiated { response: rsp, rounds: round, stalled: true, resolutions });
        }
        if round >= cfg.max_rounds {
            counter!("xfn_negotiation_nonconvergence_total", 1u64);
            return Err(EngineError::NonConvergence { function: runner.name().to_string(), rounds: round });
        }
        let mut resolved = resolve_requirements(&rsp.requirements, resolver);
        resolutions = Resolutions { requirements: rsp.requirements.clone(), resources: resolved.clone() };
        if let Some(w) = &watched {
            resolved.entry(WATCHED_RESOURCE_REQUIREMENT.to_string()).or_insert_with(|| w.clone());
        }
        debug!(
            function = runner.name(),
            tag = %req.tag(),
            round,
            requirements = rsp.requirements.len(),
            matched = resolved.values().map(Vec::len).sum::<usize>(),
            "resolved requirements"
        );
        req.extra_resources = resolved;
        prev = Some(rsp.requirements);
    }
}
