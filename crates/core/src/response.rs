//! The outbound half of a `RunFunction` call and the builder that keeps it
//! valid.
//!
//! A response is always built *from* the request it answers: [`to`] copies
//! the tag verbatim and seeds the desired state and context from the request,
//! so a function only ever adds to (or overwrites names it owns in) what
//! upstream functions produced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::codec::{self, Document};
use crate::error::{XfnError, XfnResult};
use crate::request::RunFunctionRequest;
use crate::resource::{validate_manifest, Resource};
use crate::result::{Condition, FunctionResult, Severity};
use crate::selector::{Match, Requirements, ResourceSelector};
use crate::state::State;

/// How long the orchestrator may reuse a response when nothing changed.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default)]
    pub tag: String,
    /// Zero means "always re-invoke".
    #[serde(default, with = "codec::duration", skip_serializing_if = "Duration::is_zero")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionResponse {
    #[serde(default)]
    pub meta: ResponseMeta,
    #[serde(default)]
    pub desired: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FunctionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Document>,
    #[serde(default, skip_serializing_if = "Requirements::is_empty")]
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Free-form output, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Document>,
}

impl RunFunctionResponse {
    pub fn tag(&self) -> &str { &self.meta.tag }
    pub fn ttl(&self) -> Duration { self.meta.ttl }

    /// Overall severity: the most severe result.
    pub fn severity(&self) -> Severity { Severity::classify(&self.results) }

    pub fn is_fatal(&self) -> bool { self.severity() == Severity::Fatal }

    /// No requirements pending; negotiation for this function is over.
    pub fn is_complete(&self) -> bool { self.requirements.is_empty() }

    /// Invariants that hold for any response regardless of its request.
    pub fn validate(&self) -> XfnResult<()> {
        if !self.requirements.is_empty() && !self.meta.ttl.is_zero() {
            return Err(XfnError::TtlWithRequirements {
                ttl_secs: self.meta.ttl.as_secs(),
                pending: self.requirements.len(),
            });
        }
        for (name, selector) in self.requirements.iter() {
            selector.validate(name)?;
        }
        for r in self.desired.resources.values() {
            if let Some(m) = &r.manifest {
                validate_manifest(m)?;
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the tag echo against the request.
    pub fn check_against(&self, req: &RunFunctionRequest) -> XfnResult<()> {
        if self.meta.tag != req.meta.tag {
            return Err(XfnError::TagMismatch { want: req.meta.tag.clone(), got: self.meta.tag.clone() });
        }
        self.validate()
    }
}

/// Start a response to `req`: tag, desired state and context are copied,
/// the TTL defaults to [`DEFAULT_TTL`].
pub fn to(req: &RunFunctionRequest) -> ResponseBuilder {
    ResponseBuilder {
        rsp: RunFunctionResponse {
            meta: ResponseMeta { tag: req.meta.tag.clone(), ttl: DEFAULT_TTL },
            desired: req.desired.clone(),
            context: req.context.clone(),
            ..Default::default()
        },
        ttl_explicit: false,
    }
}

/// The response for an invocation that failed with `err`: tag echoed,
/// desired state and context passed through, a single FATAL result, and a
/// zero TTL so nothing is cached.
pub fn fatal(req: &RunFunctionRequest, err: &XfnError) -> RunFunctionResponse {
    RunFunctionResponse {
        meta: ResponseMeta { tag: req.meta.tag.clone(), ttl: Duration::ZERO },
        desired: req.desired.clone(),
        context: req.context.clone(),
        results: vec![FunctionResult::fatal(err.to_string()).with_reason(err.reason())],
        ..Default::default()
    }
}

/// Mutable builder over a response in progress. See [`to`].
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    rsp: RunFunctionResponse,
    ttl_explicit: bool,
}

impl ResponseBuilder {
    pub fn normal(&mut self, message: impl Into<String>) -> &mut Self {
        self.result(FunctionResult::normal(message))
    }

    pub fn warning(&mut self, message: impl Into<String>) -> &mut Self {
        self.result(FunctionResult::warning(message))
    }

    pub fn fatal(&mut self, message: impl Into<String>) -> &mut Self {
        self.result(FunctionResult::fatal(message))
    }

    pub fn result(&mut self, result: FunctionResult) -> &mut Self {
        self.rsp.results.push(result);
        self
    }

    /// Set a condition; a condition of the same type set earlier is replaced.
    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        match self.rsp.conditions.iter_mut().find(|c| c.typ == condition.typ) {
            Some(existing) => *existing = condition,
            None => self.rsp.conditions.push(condition),
        }
        self
    }

    /// Add a new desired resource. Fails if the name is already taken,
    /// including by an upstream function.
    pub fn add_resource(&mut self, name: impl Into<String>, resource: Resource) -> XfnResult<&mut Self> {
        resource.validate()?;
        self.rsp.desired.insert(name, resource)?;
        Ok(self)
    }

    /// Set a desired resource this function owns, replacing any earlier value.
    pub fn set_resource(&mut self, name: impl Into<String>, resource: Resource) -> XfnResult<&mut Self> {
        resource.validate()?;
        self.rsp.desired.set(name, resource);
        Ok(self)
    }

    pub fn desired(&self) -> &State { &self.rsp.desired }

    /// Merge top-level fields into the desired composite.
    pub fn update_composite<T: Serialize>(&mut self, source: &T) -> XfnResult<&mut Self> {
        self.rsp.desired.composite.update(source)?;
        Ok(self)
    }

    /// Set one key of the pipeline context forwarded to later functions.
    pub fn set_context<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> XfnResult<&mut Self> {
        let v: Value = serde_json::to_value(value)?;
        self.rsp.context.get_or_insert_with(Document::new).insert(key.into(), v);
        Ok(self)
    }

    pub fn set_output<T: Serialize>(&mut self, output: &T) -> XfnResult<&mut Self> {
        self.rsp.output = Some(codec::to_document(output)?);
        Ok(self)
    }

    /// Set the TTL explicitly. A non-zero TTL together with requirements is
    /// rejected by [`build`](Self::build).
    pub fn ttl(&mut self, ttl: Duration) -> &mut Self {
        self.rsp.meta.ttl = ttl;
        self.ttl_explicit = true;
        self
    }

    /// Ask the orchestrator to resolve `selector` and call again with the
    /// result under `extra_resources[name]`. Re-declaring a name replaces it.
    pub fn require(&mut self, name: impl Into<String>, selector: ResourceSelector) -> XfnResult<&mut Self> {
        let name = name.into();
        selector.validate(&name)?;
        self.rsp.requirements.extra_resources.insert(name, selector);
        Ok(self)
    }

    pub fn require_resources(
        &mut self,
        name: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        matcher: Match,
        namespace: Option<&str>,
    ) -> XfnResult<&mut Self> {
        let selector = ResourceSelector {
            api_version: api_version.into(),
            kind: kind.into(),
            matcher,
            namespace: namespace.map(str::to_string),
        };
        self.require(name, selector)
    }

    pub fn requirements(&self) -> &Requirements { &self.rsp.requirements }

    /// Finish the response.
    ///
    /// With requirements pending, a default TTL is dropped to zero (an
    /// in-progress negotiation cannot be cached) while an explicit non-zero
    /// TTL is an error.
    pub fn build(mut self) -> XfnResult<RunFunctionResponse> {
        if !self.rsp.requirements.is_empty() && !self.ttl_explicit {
            self.rsp.meta.ttl = Duration::ZERO;
        }
        self.rsp.validate()?;
        debug!(
            tag = %self.rsp.meta.tag,
            results = self.rsp.results.len(),
            requirements = self.rsp.requirements.len(),
            ttl = ?self.rsp.meta.ttl,
            "response built"
        );
        Ok(self.rsp)
    }
}
