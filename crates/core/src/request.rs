//! The inbound half of a `RunFunction` call.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, Document};
use crate::error::{XfnError, XfnResult};
use crate::resource::Resource;
use crate::state::State;

/// Requirement name under which an operation's triggering resource arrives.
pub const WATCHED_RESOURCE_REQUIREMENT: &str = "ops.crossplane.io/watched-resource";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Opaque correlation tag; must be echoed back unchanged.
    #[serde(default)]
    pub tag: String,
}

/// Credential payloads supplied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Credentials {
    CredentialData(CredentialData),
}

impl Credentials {
    pub fn data(&self) -> &CredentialData {
        match self {
            Credentials::CredentialData(d) => d,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialData {
    #[serde(default, with = "codec::bytes_map")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl CredentialData {
    pub fn get(&self, key: &str) -> Option<&[u8]> { self.data.get(key).map(Vec::as_slice) }

    /// Lossy UTF-8 view of one entry, for tokens and passwords.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// One invocation of a function.
///
/// Conceptually immutable once handed to a function: accessors borrow, and
/// the response builder clones what it carries forward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionRequest {
    #[serde(default)]
    pub meta: RequestMeta,
    #[serde(default)]
    pub observed: State,
    #[serde(default)]
    pub desired: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Document>,
    /// Resources resolved for this function's previous requirements, by
    /// requirement name. A present key with an empty list means "resolved,
    /// nothing matched".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_resources: BTreeMap<String, Vec<Resource>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, Credentials>,
}

impl RunFunctionRequest {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { meta: RequestMeta { tag: tag.into() }, ..Default::default() }
    }

    pub fn with_observed(mut self, observed: State) -> Self {
        self.observed = observed;
        self
    }

    pub fn with_desired(mut self, desired: State) -> Self {
        self.desired = desired;
        self
    }

    /// Set the input document. `value` must serialize to an object.
    pub fn with_input<T: Serialize>(mut self, value: &T) -> XfnResult<Self> {
        self.input = Some(codec::to_document(value)?);
        Ok(self)
    }

    pub fn with_context(mut self, context: Document) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_extra_resources(mut self, name: impl Into<String>, resources: Vec<Resource>) -> Self {
        self.extra_resources.insert(name.into(), resources);
        self
    }

    pub fn with_credentials(mut self, name: impl Into<String>, data: BTreeMap<String, Vec<u8>>) -> Self {
        self.credentials.insert(name.into(), Credentials::CredentialData(CredentialData { data }));
        self
    }

    pub fn tag(&self) -> &str { &self.meta.tag }
    pub fn observed(&self) -> &State { &self.observed }
    pub fn desired(&self) -> &State { &self.desired }
    pub fn input(&self) -> Option<&Document> { self.input.as_ref() }
    pub fn context(&self) -> Option<&Document> { self.context.as_ref() }

    pub fn observed_composite(&self) -> &Resource { &self.observed.composite }

    /// Observed composed resource by name; `None` is normal on a first reconcile.
    pub fn observed_resource(&self, name: &str) -> Option<&Resource> { self.observed.resource(name) }

    pub fn desired_resource(&self, name: &str) -> Option<&Resource> { self.desired.resource(name) }

    /// Decode the input document into `T`. A missing input decodes from `{}`,
    /// so input types whose fields all default work without any input.
    pub fn input_as<T: DeserializeOwned>(&self) -> XfnResult<T> {
        let doc = self.input.clone().unwrap_or_default();
        serde_json::from_value(Value::Object(doc)).map_err(|e| XfnError::InvalidInput(e.to_string()))
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.as_ref().and_then(|c| c.get(key))
    }

    /// Whether the orchestrator has answered requirement `name` at all.
    pub fn is_resolved(&self, name: &str) -> bool { self.extra_resources.contains_key(name) }

    /// Resources resolved for requirement `name`; empty when unresolved.
    pub fn extra_resources(&self, name: &str) -> &[Resource] {
        self.extra_resources.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First resource resolved for `name`, for requirements expected to
    /// match exactly one object.
    pub fn extra_resource(&self, name: &str) -> Option<&Resource> { self.extra_resources(name).first() }

    /// The resource whose change triggered an operation, if any.
    pub fn watched_resource(&self) -> Option<&Resource> { self.extra_resource(WATCHED_RESOURCE_REQUIREMENT) }

    /// Credential by name. Absence is fatal: the orchestrator should have
    /// supplied every credential the function declared.
    pub fn credentials(&self, name: &str) -> XfnResult<&CredentialData> {
        self.credentials
            .get(name)
            .map(Credentials::data)
            .ok_or_else(|| XfnError::CredentialNotFound(name.to_string()))
    }
}
