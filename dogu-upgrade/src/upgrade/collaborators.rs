//! Collaborators of the upgrade which live outside of this crate: the dogu registry, the image
//! registry, service account provisioning, manifest generation and custom resource handling.

use crate::{
    common::{
        constants::{DEFAULT_STARTUP_PROBE_FAILURE_THRESHOLD, UPGRADE_STARTUP_PROBE_FAILURE_THRESHOLD},
        error::{Error::EmptyDeploymentSpec, Result},
    },
    dogu::{Dogu, DoguDescriptor},
    k8s::event_helper::EventSink,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::{collections::BTreeMap, sync::Arc};

#[cfg(test)]
use mockall::automock;

/// The parts of an image configuration the generated manifests depend on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageConfig {
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    /// Exposed ports, e.g. `8080/tcp`.
    pub exposed_ports: Vec<String>,
}

/// Local registry of installed dogu descriptors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DoguRegistry: Send + Sync {
    /// The descriptor of the currently installed version.
    async fn get_current(&self, simple_name: &str) -> Result<DoguDescriptor>;

    /// Records `descriptor` as installed version.
    async fn register_version(&self, descriptor: &DoguDescriptor) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn pull_config(&self, image_ref: &str) -> Result<ImageConfig>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceAccountCreator: Send + Sync {
    /// Creates the service accounts `descriptor` declares. Existing accounts are skipped.
    async fn create_all(&self, descriptor: &DoguDescriptor) -> Result<()>;
}

/// Generates and creates or updates the cluster objects of a dogu.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceUpserter: Send + Sync {
    async fn upsert_service(&self, resource: &Dogu, image: &ImageConfig) -> Result<()>;

    async fn upsert_exposed_services(&self, resource: &Dogu, descriptor: &DoguDescriptor)
        -> Result<()>;

    /// Creates or updates the Deployment. `patch` is applied to the generated object before it
    /// is sent to the cluster.
    async fn upsert_deployment(
        &self,
        resource: &Dogu,
        descriptor: &DoguDescriptor,
        patch: &DeploymentPatch,
    ) -> Result<()>;

    async fn upsert_pvcs(&self, resource: &Dogu, descriptor: &DoguDescriptor) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CollectApplier: Send + Sync {
    /// Applies the manifests, keyed by the path they were read from.
    async fn collect_apply(&self, manifests: &BTreeMap<String, String>, resource: &Dogu)
        -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DependencyValidator: Send + Sync {
    /// Fails unless the mandatory and optional dependency constraints of `descriptor` hold.
    async fn validate_dependencies(&self, descriptor: &DoguDescriptor) -> Result<()>;
}

/// The collaborators an upgrade is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn DoguRegistry>,
    pub images: Arc<dyn ImageRegistry>,
    pub service_accounts: Arc<dyn ServiceAccountCreator>,
    pub upserter: Arc<dyn ResourceUpserter>,
    pub applier: Arc<dyn CollectApplier>,
    pub dependency_validator: Arc<dyn DependencyValidator>,
    pub events: Arc<dyn EventSink>,
}

/// Changes applied to a dogu Deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeploymentPatch {
    pub startup_probe_failure_threshold: i32,
}

impl DeploymentPatch {
    /// Tolerates a slow first start after an upgrade.
    pub fn upgrade() -> Self {
        Self {
            startup_probe_failure_threshold: UPGRADE_STARTUP_PROBE_FAILURE_THRESHOLD,
        }
    }

    /// The startup probe outside of upgrades.
    pub fn regular() -> Self {
        Self {
            startup_probe_failure_threshold: DEFAULT_STARTUP_PROBE_FAILURE_THRESHOLD,
        }
    }

    /// Sets the failure threshold of every container startup probe.
    pub fn apply(&self, deployment: &mut Deployment) -> Result<()> {
        let name = deployment.name_any();
        let namespace = deployment.namespace().unwrap_or_default();
        let pod_spec = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or(EmptyDeploymentSpec { name, namespace })?;

        for container in pod_spec.containers.iter_mut() {
            if let Some(probe) = container.startup_probe.as_mut() {
                probe.failure_threshold = Some(self.startup_probe_failure_threshold);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn deployment_with_startup_probe(name: &str, threshold: i32) -> Deployment {
    use k8s_openapi::{
        api::{
            apps::v1::DeploymentSpec,
            core::v1::{Container, PodSpec, PodTemplateSpec, Probe},
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ecosystem".to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        startup_probe: Some(Probe {
                            failure_threshold: Some(threshold),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
pub(crate) fn startup_probe_threshold(deployment: &Deployment) -> Option<i32> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find_map(|c| c.startup_probe.as_ref()?.failure_threshold)
}
