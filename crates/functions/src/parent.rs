//! Looks up a "parent" object through the extra-resources negotiation and
//! derives a resource from it.
//!
//! Round one only declares the `parent` requirement. Once the parent is
//! resolved the function composes `parent-<name>`; if the parent names a
//! secret in `data.secretName` it also asks for that secret (re-declaring
//! `parent` so it stays resolved) and copies the secret's data into the
//! derived resource's connection details.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use xfn_api::FunctionRunner;
use xfn_core::prelude::*;

pub const NAME: &str = "parent-lookup";
pub const PARENT: &str = "parent";
pub const PARENT_SECRET: &str = "parent-secret";

/// Describes the parent selector. Everything is optional: by default the
/// parent is the `v1` ConfigMap named after the composite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInput {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub match_name: Option<String>,
    pub match_labels: Option<BTreeMap<String, String>>,
    pub namespace: Option<String>,
}

impl ParentInput {
    /// The selector for `parent`, given the composite it is looked up for.
    pub fn selector(&self, composite: &Resource) -> XfnResult<ResourceSelector> {
        let api_version = self.api_version.clone().unwrap_or_else(|| "v1".to_string());
        let kind = self.kind.clone().unwrap_or_else(|| "ConfigMap".to_string());
        let matcher = match (&self.match_labels, &self.match_name) {
            (Some(_), Some(_)) => {
                return Err(XfnError::InvalidInput("set only one of matchName and matchLabels".into()))
            }
            (Some(labels), None) => Match::Labels(labels.clone()),
            (None, Some(name)) => Match::Name(name.clone()),
            (None, None) => match composite.name() {
                Some(n) => Match::Name(n.to_string()),
                None => return Err(XfnError::InvalidInput("no matchName given and the composite has no name".into())),
            },
        };
        let sel = ResourceSelector { api_version, kind, matcher, namespace: self.namespace.clone() };
        sel.validate(PARENT)?;
        Ok(sel)
    }
}

/// Secret `data` is base64 on the wire; undecodable entries are skipped.
fn secret_data(secret: &Resource) -> BTreeMap<String, Vec<u8>> {
    let Some(data) = secret.pointer("/data").and_then(Value::as_object) else { return BTreeMap::new() };
    data.iter()
        .filter_map(|(k, v)| {
            let raw = v.as_str()?;
            base64::engine::general_purpose::STANDARD.decode(raw).ok().map(|b| (k.clone(), b))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParentLookupFunction;

impl ParentLookupFunction {
    pub fn compose(req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> {
        let input: ParentInput = req.input_as()?;
        let selector = input.selector(req.observed_composite())?;
        let mut rsp = response::to(req);

        if !req.is_resolved(PARENT) {
            debug!(tag = %req.tag(), "parent not resolved yet; requiring it");
            rsp.require(PARENT, selector)?;
            return rsp.build();
        }

        let Some(parent) = req.extra_resource(PARENT) else {
            rsp.result(FunctionResult::warning("parent not found; nothing composed").with_reason("ParentNotFound"));
            rsp.condition(Condition::new("ParentResolved", Status::False, "NotFound"));
            return rsp.build();
        };

        let parent_name = parent.name().unwrap_or("unnamed").to_string();
        let mut derived = Resource::builder().manifest(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"labels": {"xfn.io/parent": parent_name}},
            "data": parent.pointer("/data").cloned().unwrap_or_else(|| json!({})),
        }));

        if let Some(secret_name) = parent.pointer("/data/secretName").and_then(Value::as_str) {
            if req.is_resolved(PARENT_SECRET) {
                match req.extra_resource(PARENT_SECRET) {
                    Some(secret) => derived = derived.connection_details(secret_data(secret)),
                    None => {
                        rsp.result(
                            FunctionResult::warning(format!("secret {secret_name} named by the parent was not found"))
                                .with_reason("ParentSecretNotFound"),
                        );
                    }
                }
            } else {
                let mut secret_sel = ResourceSelector::by_name("v1", "Secret", secret_name);
                if let Some(ns) = parent.namespace() {
                    secret_sel = secret_sel.in_namespace(ns);
                }
                rsp.require(PARENT, selector)?;
                rsp.require(PARENT_SECRET, secret_sel)?;
            }
        }

        rsp.set_resource(format!("parent-{parent_name}"), derived.build()?)?;
        if rsp.requirements().is_empty() {
            rsp.normal(format!("found parent {parent_name}"));
            rsp.condition(Condition::new("ParentResolved", Status::True, "Found"));
        }
        rsp.build()
    }
}

#[async_trait::async_trait]
impl FunctionRunner for ParentLookupFunction {
    fn name(&self) -> &str { NAME }

    async fn run_function(&self, req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> { Self::compose(req) }
}
