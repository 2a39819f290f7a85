//! A single resource as exchanged with a function: its manifest, its
//! connection secrets and its readiness.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, Document};
use crate::error::{XfnError, XfnResult};
use crate::result::Status;

/// Readiness of a resource. `Unspecified` means "infer it", not "false".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ready {
    #[default]
    #[serde(rename = "READY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "READY_TRUE")]
    True,
    #[serde(rename = "READY_FALSE")]
    False,
}

impl Ready {
    pub fn is_unspecified(&self) -> bool { matches!(self, Ready::Unspecified) }
}

impl From<bool> for Ready {
    fn from(v: bool) -> Self { if v { Ready::True } else { Ready::False } }
}

/// A composite or composed resource.
///
/// Fields are public so observed entries (which may lack a manifest) can be
/// expressed as plain data. Desired resources should go through
/// [`Resource::builder`] or [`Resource::from_manifest`], which validate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The resource body. Travels as `resource` on the wire.
    #[serde(rename = "resource", default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Document>,
    /// Connection secrets. `None` is "unknown", `Some(empty)` is "none".
    #[serde(default, skip_serializing_if = "Option::is_none", with = "codec::opt_bytes_map")]
    pub connection_details: Option<BTreeMap<String, Vec<u8>>>,
    #[serde(default, skip_serializing_if = "Ready::is_unspecified")]
    pub ready: Ready,
}

/// Strict constructor for [`Resource`].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    manifest: Option<Value>,
    connection_details: Option<BTreeMap<String, Vec<u8>>>,
    ready: Ready,
}

impl ResourceBuilder {
    pub fn manifest(mut self, manifest: Value) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn connection_detail(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.connection_details.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
        self
    }

    pub fn connection_details(mut self, details: BTreeMap<String, Vec<u8>>) -> Self {
        self.connection_details = Some(details);
        self
    }

    pub fn ready(mut self, ready: Ready) -> Self {
        self.ready = ready;
        self
    }

    pub fn build(self) -> XfnResult<Resource> {
        let manifest = match self.manifest {
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(XfnError::MalformedResource(format!(
                    "manifest must be an object, got {}",
                    codec::kind_of(&other)
                )))
            }
            None => None,
        };
        let r = Resource { manifest, connection_details: self.connection_details, ready: self.ready };
        r.validate()?;
        Ok(r)
    }
}

impl Resource {
    pub fn builder() -> ResourceBuilder { ResourceBuilder::default() }

    /// Build a desired resource from anything that serializes to a manifest,
    /// typed Kubernetes objects included.
    pub fn from_manifest<T: Serialize>(manifest: &T) -> XfnResult<Self> {
        Resource::builder().manifest(serde_json::to_value(manifest)?).build()
    }

    /// Strict validation: rejects empty resources and manifests without identity.
    pub fn validate(&self) -> XfnResult<()> {
        if self.is_empty() {
            return Err(XfnError::EmptyResource);
        }
        match &self.manifest {
            Some(m) => validate_manifest(m),
            None => Ok(()),
        }
    }

    /// True when nothing about the resource is known.
    pub fn is_empty(&self) -> bool {
        self.manifest.is_none() && self.connection_details.is_none() && self.ready.is_unspecified()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.manifest.as_ref().and_then(|m| m.get(key))
    }

    /// JSON-pointer lookup into the manifest, e.g. `/spec/replicas`.
    pub fn pointer(&self, ptr: &str) -> Option<&Value> {
        let mut segs = ptr.strip_prefix('/')?.split('/');
        let mut cur = self.manifest.as_ref()?.get(segs.next()?)?;
        for seg in segs {
            cur = match cur {
                Value::Object(m) => m.get(seg)?,
                Value::Array(a) => a.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn api_version(&self) -> Option<&str> { self.field("apiVersion").and_then(Value::as_str) }
    pub fn kind(&self) -> Option<&str> { self.field("kind").and_then(Value::as_str) }
    pub fn name(&self) -> Option<&str> { self.pointer("/metadata/name").and_then(Value::as_str) }
    pub fn namespace(&self) -> Option<&str> { self.pointer("/metadata/namespace").and_then(Value::as_str) }

    /// `metadata.labels`, skipping non-string values.
    pub fn labels(&self) -> BTreeMap<&str, &str> {
        self.pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v))).collect())
            .unwrap_or_default()
    }

    /// Add or overwrite top-level manifest fields from `source`, with the
    /// same semantics as a dictionary update. Nested objects are replaced,
    /// not merged.
    pub fn update<T: Serialize>(&mut self, source: &T) -> XfnResult<()> {
        let src = codec::to_document(source)?;
        let manifest = self.manifest.get_or_insert_with(Document::new);
        for (k, v) in src {
            manifest.insert(k, v);
        }
        Ok(())
    }

    /// Read a status condition from `status.conditions`.
    ///
    /// Always returns a condition: one with status `Unknown` when the
    /// resource has no status, no conditions, or no condition of that type.
    pub fn condition(&self, typ: &str) -> StatusCondition {
        let found = self
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .and_then(|cs| cs.iter().find(|c| c.get("type").and_then(Value::as_str) == Some(typ)));
        let Some(c) = found else { return StatusCondition::unknown(typ) };
        let text = |k: &str| c.get(k).and_then(Value::as_str).map(str::to_string);
        StatusCondition {
            typ: typ.to_string(),
            status: c.get("status").and_then(Value::as_str).map(Status::from_k8s).unwrap_or(Status::Unknown),
            reason: text("reason"),
            message: text("message"),
            last_transition_time: c
                .get("lastTransitionTime")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Checks that a manifest carries the identity fields every object needs.
pub fn validate_manifest(m: &Document) -> XfnResult<()> {
    for key in ["apiVersion", "kind"] {
        match m.get(key) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(other) => {
                return Err(XfnError::MalformedResource(format!(
                    "{key} must be a non-empty string, got {}",
                    codec::kind_of(other)
                )))
            }
            None => return Err(XfnError::MalformedResource(format!("manifest is missing {key}"))),
        }
    }
    Ok(())
}

/// A status condition as observed on a resource manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCondition {
    pub typ: String,
    pub status: Status,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl StatusCondition {
    pub fn unknown(typ: &str) -> Self {
        Self { typ: typ.to_string(), status: Status::Unknown, reason: None, message: None, last_transition_time: None }
    }
}
