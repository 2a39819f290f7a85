//! Composes one `apps/v1` Deployment per composite.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, LocalObjectReference, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use xfn_api::FunctionRunner;
use xfn_core::prelude::*;

pub const NAME: &str = "deployment";

/// Name of the desired resource this function owns.
pub const RESOURCE: &str = "deployment";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInput {
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default = "default_image")]
    pub image: String,
    /// Credential whose name is used as the pod's image pull secret.
    #[serde(default)]
    pub image_pull_credentials: Option<String>,
}

fn default_replicas() -> u32 { 1 }
fn default_image() -> String { "nginx:stable".to_string() }

impl Default for DeploymentInput {
    fn default() -> Self { Self { replicas: default_replicas(), image: default_image(), image_pull_credentials: None } }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentFunction;

impl DeploymentFunction {
    /// The whole function, synchronously. Pure over `req`.
    pub fn compose(req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> {
        let input: DeploymentInput = req.input_as()?;
        let replicas = i32::try_from(input.replicas)
            .map_err(|_| XfnError::InvalidInput(format!("replicas out of range: {}", input.replicas)))?;
        let pull_secrets = match &input.image_pull_credentials {
            Some(name) => {
                req.credentials(name)?;
                Some(vec![LocalObjectReference { name: Some(name.clone()) }])
            }
            None => None,
        };

        let app = req.observed_composite().name().unwrap_or(NAME).to_string();
        let labels: BTreeMap<String, String> = [("app".to_string(), app)].into();
        let deployment = Deployment {
            metadata: ObjectMeta { labels: Some(labels.clone()), ..Default::default() },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "app".to_string(),
                            image: Some(input.image.clone()),
                            ..Default::default()
                        }],
                        image_pull_secrets: pull_secrets,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let available = req
            .observed_resource(RESOURCE)
            .and_then(|r| r.pointer("/status/availableReplicas"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let ready = Ready::from(available >= i64::from(replicas));
        debug!(tag = %req.tag(), replicas, available, ready = ?ready, "composed deployment");

        let resource = Resource::builder().manifest(serde_json::to_value(&deployment)?).ready(ready).build()?;
        let mut rsp = response::to(req);
        rsp.set_resource(RESOURCE, resource)?;
        rsp.normal("created deployment");
        rsp.condition(Condition::new("FunctionSuccess", Status::True, "Success"));
        rsp.build()
    }
}

#[async_trait::async_trait]
impl FunctionRunner for DeploymentFunction {
    fn name(&self) -> &str { NAME }

    async fn run_function(&self, req: &RunFunctionRequest) -> XfnResult<RunFunctionResponse> { Self::compose(req) }
}
