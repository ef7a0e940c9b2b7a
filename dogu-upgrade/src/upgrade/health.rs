use crate::{
    cluster::ClusterApi,
    common::{
        error::{
            Error::{DependenciesUnhealthy, DoguNotHealthy},
            Result,
        },
        Error,
    },
    dogu::{Dogu, DoguDescriptor},
    upgrade::collaborators::DoguRegistry,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Health of dogus, judged by the ready replicas of their Deployment.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DoguHealthCheck: Send + Sync {
    async fn check(&self, resource: &Dogu) -> Result<()>;

    /// Checks every mandatory dogu dependency, transitively. All failures are reported
    /// together.
    async fn check_dependencies_recursive(
        &self,
        descriptor: &DoguDescriptor,
        namespace: &str,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct DoguHealthChecker {
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<dyn DoguRegistry>,
}

impl DoguHealthChecker {
    pub fn new(cluster: Arc<dyn ClusterApi>, registry: Arc<dyn DoguRegistry>) -> Self {
        Self { cluster, registry }
    }

    async fn check_dogu(&self, simple_name: &str, namespace: &str) -> Result<()> {
        let deployment = self.cluster.get_deployment(namespace, simple_name).await?;
        deployment_health(&deployment, simple_name, namespace)
    }
}

#[async_trait]
impl DoguHealthCheck for DoguHealthChecker {
    async fn check(&self, resource: &Dogu) -> Result<()> {
        self.check_dogu(resource.simple_name(), &resource.namespace_or_default())
            .await
    }

    async fn check_dependencies_recursive(
        &self,
        descriptor: &DoguDescriptor,
        namespace: &str,
    ) -> Result<()> {
        let mut failures: Vec<Error> = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([descriptor.simple_name().to_string()]);
        let mut pending: Vec<String> = dependency_names(descriptor);

        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            debug!(dogu.name = %name, "Checking health of dependency");

            let health = self.check_dogu(&name, namespace).await;
            match self.registry.get_current(&name).await {
                Ok(dependency) => pending.extend(dependency_names(&dependency)),
                // An unhealthy dogu is already reported; its missing registration adds nothing.
                Err(error) if health.is_ok() => failures.push(error),
                Err(error) => debug!(dogu.name = %name, %error, "No descriptor for unhealthy dependency"),
            }
            if let Err(error) = health {
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DependenciesUnhealthy {
                dogu: descriptor.name.clone(),
                failures,
            })
        }
    }
}

fn dependency_names(descriptor: &DoguDescriptor) -> Vec<String> {
    descriptor
        .mandatory_dogu_dependencies()
        .map(|d| {
            d.name
                .rsplit_once('/')
                .map(|(_, simple)| simple)
                .unwrap_or(&d.name)
                .to_string()
        })
        .collect()
}

/// A dogu is healthy once at least as many replicas are ready as desired. A Deployment scaled
/// to zero is not.
fn deployment_health(deployment: &Deployment, dogu: &str, namespace: &str) -> Result<()> {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);

    if desired > 0 && ready >= desired {
        Ok(())
    } else {
        Err(DoguNotHealthy {
            dogu: dogu.to_string(),
            namespace: namespace.to_string(),
            ready,
            desired,
        })
    }
}

#[cfg(test)]
pub(crate) fn deployment_with_replicas(name: &str, desired: i32, ready: i32) -> Deployment {
    use k8s_openapi::{
        api::apps::v1::{DeploymentSpec, DeploymentStatus},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            ready_replicas: Some(ready),
            ..Default::default()
        }),
    }
}
