//! Library errors for the protocol layer.

use thiserror::Error;

/// Errors raised while building or validating protocol values.
///
/// None of these are transport faults. A function handler is expected to
/// turn them into a FATAL result (see `response::fatal`) so the orchestrator
/// can record the diagnostic against the composite.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XfnError {
    /// A manifest is not an object or lacks `apiVersion`/`kind`.
    #[error("malformed resource: {0}")]
    MalformedResource(String),

    /// No manifest, no connection details and unspecified readiness.
    #[error("resource carries no manifest, connection details or readiness")]
    EmptyResource,

    /// A second resource was inserted under a name already present in a State.
    #[error("duplicate resource name: {0}")]
    DuplicateResourceName(String),

    /// A function asked for a credential the request does not carry.
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    /// A response does not echo the tag of the request it answers.
    #[error("response tag {got:?} does not match request tag {want:?}")]
    TagMismatch {
        /// Tag of the request.
        want: String,
        /// Tag found on the response.
        got: String,
    },

    /// A non-zero TTL was set while requirements are still pending.
    #[error("response sets a ttl of {ttl_secs}s while {pending} requirement(s) are pending")]
    TtlWithRequirements {
        /// Offending TTL in whole seconds.
        ttl_secs: u64,
        /// Number of pending requirements.
        pending: usize,
    },

    /// A resource selector is incomplete.
    #[error("invalid selector {name:?}: {reason}")]
    InvalidSelector {
        /// Requirement name the selector was registered under.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The function input document does not have the expected shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Encoding or decoding a document failed.
    #[error("codec: {0}")]
    Codec(String),
}

pub type XfnResult<T> = Result<T, XfnError>;

impl From<serde_json::Error> for XfnError {
    fn from(e: serde_json::Error) -> Self {
        XfnError::Codec(e.to_string())
    }
}

impl From<serde_yaml::Error> for XfnError {
    fn from(e: serde_yaml::Error) -> Self {
        XfnError::Codec(e.to_string())
    }
}

impl XfnError {
    /// Stable machine-readable reason, used as the `reason` of FATAL results.
    pub fn reason(&self) -> &'static str {
        match self {
            XfnError::MalformedResource(_) => "MalformedResource",
            XfnError::EmptyResource => "EmptyResource",
            XfnError::DuplicateResourceName(_) => "DuplicateResourceName",
            XfnError::CredentialNotFound(_) => "CredentialNotFound",
            XfnError::TagMismatch { .. } => "TagMismatch",
            XfnError::TtlWithRequirements { .. } => "TtlWithRequirements",
            XfnError::InvalidSelector { .. } => "InvalidSelector",
            XfnError::InvalidInput(_) => "InvalidInput",
            XfnError::Codec(_) => "MalformedInput",
        }
    }

    /// Whether the error is a protocol violation rather than bad input.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            XfnError::TagMismatch { .. }
                | XfnError::TtlWithRequirements { .. }
                | XfnError::DuplicateResourceName(_)
        )
    }
}
