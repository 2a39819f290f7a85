//! Resource selectors and the requirements a function declares with them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{XfnError, XfnResult};
use crate::resource::Resource;

/// How a selector matches objects of its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Match {
    /// Exactly one object with this `metadata.name` (or none).
    #[serde(rename = "matchName")]
    Name(String),
    /// Every object carrying all of these labels (zero, one or many).
    #[serde(rename = "matchLabels")]
    Labels(BTreeMap<String, String>),
}

/// Selects existing objects for a function to look at on its next call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    #[serde(flatten)]
    pub matcher: Match,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceSelector {
    pub fn by_name(api_version: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { api_version: api_version.into(), kind: kind.into(), matcher: Match::Name(name.into()), namespace: None }
    }

    pub fn by_labels<K, V, I>(api_version: impl Into<String>, kind: impl Into<String>, labels: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let labels = labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { api_version: api_version.into(), kind: kind.into(), matcher: Match::Labels(labels), namespace: None }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Check the selector is complete. `name` is the requirement name, used
    /// only for the error message.
    pub fn validate(&self, name: &str) -> XfnResult<()> {
        let invalid = |reason: &str| XfnError::InvalidSelector { name: name.to_string(), reason: reason.to_string() };
        if name.is_empty() {
            return Err(invalid("requirement name must not be empty"));
        }
        if self.api_version.is_empty() {
            return Err(invalid("apiVersion must not be empty"));
        }
        if self.kind.is_empty() {
            return Err(invalid("kind must not be empty"));
        }
        if let Match::Name(n) = &self.matcher {
            if n.is_empty() {
                return Err(invalid("matchName must not be empty"));
            }
        }
        Ok(())
    }

    /// Whether an existing object satisfies this selector.
    pub fn matches(&self, r: &Resource) -> bool {
        if r.api_version() != Some(self.api_version.as_str()) || r.kind() != Some(self.kind.as_str()) {
            return false;
        }
        if let Some(ns) = &self.namespace {
            if r.namespace() != Some(ns.as_str()) {
                return false;
            }
        }
        match &self.matcher {
            Match::Name(name) => r.name() == Some(name.as_str()),
            Match::Labels(want) => {
                let have = r.labels();
                want.iter().all(|(k, v)| have.get(k.as_str()) == Some(&v.as_str()))
            }
        }
    }
}

/// What a function still needs before it can finish.
///
/// Non-empty requirements mean "call me again with these resolved".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_resources: BTreeMap<String, ResourceSelector>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool { self.extra_resources.is_empty() }
    pub fn len(&self) -> usize { self.extra_resources.len() }
    pub fn get(&self, name: &str) -> Option<&ResourceSelector> { self.extra_resources.get(name) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceSelector)> {
        self.extra_resources.iter().map(|(k, v)| (k.as_str(), v))
    }
}
