//! The reference pipeline: one composite, a fixed list of functions, run in
//! order.
//!
//! Each step sees the desired state accumulated by the steps before it. A
//! FATAL result from any step fails the whole run: nothing is applied and
//! the composite is requeued with backoff. A function that never settles
//! its requirements fails the run the same way.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use xfn_api::SharedRunner;
use xfn_core::codec;
use xfn_core::{
    Condition, Credentials, Document, FunctionResult, ResponseMeta, RunFunctionRequest, RunFunctionResponse, Severity,
    State, XfnResult,
};

use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::negotiate::negotiate;
use crate::resolve::Resolver;

/// One function in the pipeline with its per-step input and credentials.
#[derive(Clone)]
pub struct Step {
    pub runner: SharedRunner,
    pub input: Option<Document>,
    pub credentials: BTreeMap<String, Credentials>,
}

impl Step {
    pub fn new(runner: SharedRunner) -> Self { Self { runner, input: None, credentials: BTreeMap::new() } }

    pub fn with_input<T: serde::Serialize>(mut self, input: &T) -> XfnResult<Self> {
        self.input = Some(codec::to_document(input)?);
        Ok(self)
    }

    pub fn with_credentials(mut self, name: impl Into<String>, data: BTreeMap<String, Vec<u8>>) -> Self {
        self.credentials.insert(name.into(), Credentials::CredentialData(xfn_core::CredentialData { data }));
        self
    }
}

/// Whether the desired state of a run may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Applied,
    Failed,
}

/// One result, tagged with the step that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub function: String,
    pub result: FunctionResult,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: RunStatus,
    /// Accumulated desired state. Must not be applied when `status` is
    /// `Failed`.
    pub desired: State,
    pub context: Option<Document>,
    pub results: Vec<StepResult>,
    /// Latest condition per type.
    pub conditions: Vec<Condition>,
    pub severity: Severity,
    pub requeue_after: Duration,
    /// Calls made across all steps; cache hits count zero.
    pub rounds: u32,
}

impl Outcome {
    pub fn is_applied(&self) -> bool { self.status == RunStatus::Applied }

    pub fn condition(&self, typ: &str) -> Option<&Condition> { self.conditions.iter().find(|c| c.typ == typ) }
}

fn set_condition(conditions: &mut Vec<Condition>, c: Condition) {
    match conditions.iter_mut().find(|e| e.typ == c.typ) {
        Some(existing) => *existing = c,
        None => conditions.push(c),
    }
}

/// The FATAL response standing in for a function that never settled.
fn unsettled(req: &RunFunctionRequest, err: &EngineError) -> RunFunctionResponse {
    RunFunctionResponse {
        meta: ResponseMeta { tag: req.meta.tag.clone(), ttl: Duration::ZERO },
        results: vec![FunctionResult::fatal(err.to_string()).with_reason("NonConvergence")],
        ..Default::default()
    }
}

pub struct Engine {
    steps: Vec<Step>,
    resolver: Arc<dyn Resolver>,
    cache: Mutex<ResponseCache>,
    cfg: EngineConfig,
}

impl Engine {
    pub fn new(steps: Vec<Step>, resolver: Arc<dyn Resolver>, cfg: EngineConfig) -> Self {
        Self { steps, resolver, cache: Mutex::new(ResponseCache::new()), cfg }
    }

    pub fn config(&self) -> &EngineConfig { &self.cfg }

    pub fn cached_responses(&self) -> usize { self.cache.lock().map(|c| c.len()).unwrap_or(0) }

    /// Run every step once for `observed`. `attempt` counts consecutive
    /// failed runs of this composite and drives the backoff.
    pub async fn reconcile(&self, observed: State, context: Option<Document>, attempt: u32) -> EngineResult<Outcome> {
        let composite = observed.composite.name().unwrap_or("-").to_string();
        let span = info_span!("reconcile", composite = %composite, attempt);
        self.run_steps(observed, context, attempt).instrument(span).await
    }

    async fn run_steps(&self, observed: State, context: Option<Document>, attempt: u32) -> EngineResult<Outcome> {
        let mut desired = State::default();
        let mut context = context;
        let mut results = Vec::new();
        let mut conditions = Vec::new();
        let mut rounds = 0u32;
        let mut min_ttl: Option<Duration> = None;

        if let Ok(mut c) = self.cache.lock() {
            let purged = c.purge_expired(Instant::now());
            if purged > 0 {
                debug!(purged, "dropped expired cached responses");
            }
        }

        for step in &self.steps {
            let function = step.runner.name().to_string();
            let req = RunFunctionRequest {
                meta: xfn_core::RequestMeta { tag: Uuid::new_v4().to_string() },
                observed: observed.clone(),
                desired: desired.clone(),
                input: step.input.clone(),
                context: context.clone(),
                extra_resources: BTreeMap::new(),
                credentials: step.credentials.clone(),
            };

            let now = Instant::now();
            let cached = self.cache.lock().ok().and_then(|mut c| c.get(&function, &req, self.resolver.as_ref(), now));
            let rsp = match cached {
                Some(rsp) => rsp,
                None => match negotiate(step.runner.as_ref(), req.clone(), self.resolver.as_ref(), &self.cfg).await {
                    Ok(n) => {
                        rounds += n.rounds;
                        if let Ok(mut c) = self.cache.lock() {
                            c.insert(&function, &req, &n.response, n.resolutions, Instant::now());
                        }
                        n.response
                    }
                    Err(EngineError::NonConvergence { function: f, rounds: r }) => {
                        rounds += r;
                        let err = EngineError::NonConvergence { function: f, rounds: r };
                        warn!(error = %err, "negotiation did not converge");
                        unsettled(&req, &err)
                    }
                    Err(e) => return Err(e),
                },
            };

            results.extend(rsp.results.iter().cloned().map(|result| StepResult { function: function.clone(), result }));
            for c in &rsp.conditions {
                set_condition(&mut conditions, c.clone());
            }

            if rsp.is_fatal() {
                let requeue_after = self.cfg.backoff(attempt);
                counter!("xfn_pipeline_failed_total", 1u64);
                warn!(function = %function, requeue_after_secs = requeue_after.as_secs(), "fatal result; run failed");
                return Ok(Outcome {
                    status: RunStatus::Failed,
                    desired,
                    context,
                    results,
                    conditions,
                    severity: Severity::Fatal,
                    requeue_after,
                    rounds,
                });
            }

            desired.merge(&rsp.desired);
            if rsp.context.is_some() {
                context = rsp.context.clone();
            }
            if !rsp.ttl().is_zero() {
                min_ttl = Some(min_ttl.map_or(rsp.ttl(), |t| t.min(rsp.ttl())));
            }
        }

        let severity = Severity::classify(results.iter().map(|r| &r.result));
        let mut requeue_after = min_ttl.map_or(self.cfg.poll, |t| t.min(self.cfg.poll));
        if severity == Severity::Warning {
            requeue_after = requeue_after.min(self.cfg.warning_poll);
        }
        counter!("xfn_pipeline_applied_total", 1u64);
        info!(steps = self.steps.len(), rounds, severity = %severity, resources = desired.len(), "run applied");
        Ok(Outcome { status: RunStatus::Applied, desired, context, results, conditions, severity, requeue_after, rounds })
    }
}
