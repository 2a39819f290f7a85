//! Result and condition taxonomy.
//!
//! Results are one-shot diagnostics rendered to the operator; their severity
//! decides what the orchestrator does with the whole pipeline run. Conditions
//! are state: a named, typed status that persists on the composite (and
//! optionally the claim) until a later reconcile overwrites it.

use serde::{Deserialize, Serialize};

/// Severity of a [`FunctionResult`]. Ordered so that `Fatal > Warning > Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational only.
    #[serde(rename = "SEVERITY_NORMAL")]
    Normal,
    /// Desired state is still applied; the message is surfaced and the next
    /// poll comes sooner.
    #[serde(rename = "SEVERITY_WARNING")]
    Warning,
    /// The pipeline run failed: nothing is applied and the reconcile is
    /// requeued with backoff, regardless of any TTL.
    #[serde(rename = "SEVERITY_FATAL")]
    Fatal,
}

impl Severity {
    /// Most severe severity among `results`; `Normal` when there are none.
    pub fn classify<'a, I>(results: I) -> Severity
    where
        I: IntoIterator<Item = &'a FunctionResult>,
    {
        results.into_iter().map(|r| r.severity).max().unwrap_or(Severity::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Warning => "Warning",
            Severity::Fatal => "Fatal",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a result or condition is published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Only the composite resource.
    #[default]
    #[serde(rename = "TARGET_COMPOSITE")]
    Composite,
    /// The composite and the claim bound to it.
    #[serde(rename = "TARGET_COMPOSITE_AND_CLAIM")]
    CompositeAndClaim,
}

impl Target {
    pub fn is_composite(&self) -> bool { matches!(self, Target::Composite) }
    pub fn includes_claim(&self) -> bool { matches!(self, Target::CompositeAndClaim) }
}

/// A diagnostic message emitted by a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Target::is_composite")]
    pub target: Target,
}

impl FunctionResult {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into(), reason: None, target: Target::Composite }
    }

    pub fn normal(message: impl Into<String>) -> Self { Self::new(Severity::Normal, message) }
    pub fn warning(message: impl Into<String>) -> Self { Self::new(Severity::Warning, message) }
    pub fn fatal(message: impl Into<String>) -> Self { Self::new(Severity::Fatal, message) }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Also publish on the claim.
    pub fn for_claim(mut self) -> Self {
        self.target = Target::CompositeAndClaim;
        self
    }

    pub fn is_fatal(&self) -> bool { self.severity == Severity::Fatal }
}

/// Status of a [`Condition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    #[serde(rename = "STATUS_CONDITION_UNKNOWN")]
    Unknown,
    #[serde(rename = "STATUS_CONDITION_TRUE")]
    True,
    #[serde(rename = "STATUS_CONDITION_FALSE")]
    False,
}

impl Status {
    /// Parse the `"True"`/`"False"`/`"Unknown"` strings used in manifests.
    /// Anything else is `Unknown`.
    pub fn from_k8s(s: &str) -> Self {
        match s {
            "True" => Status::True,
            "False" => Status::False,
            _ => Status::Unknown,
        }
    }

    pub fn as_k8s(&self) -> &'static str {
        match self {
            Status::True => "True",
            Status::False => "False",
            Status::Unknown => "Unknown",
        }
    }
}

impl From<bool> for Status {
    fn from(v: bool) -> Self { if v { Status::True } else { Status::False } }
}

/// A status condition a function asks the orchestrator to set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub typ: String,
    pub status: Status,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Target::is_composite")]
    pub target: Target,
}

impl Condition {
    pub fn new(typ: impl Into<String>, status: Status, reason: impl Into<String>) -> Self {
        Self { typ: typ.into(), status, reason: reason.into(), message: None, target: Target::Composite }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn for_claim(mut self) -> Self {
        self.target = Target::CompositeAndClaim;
        self
    }
}
