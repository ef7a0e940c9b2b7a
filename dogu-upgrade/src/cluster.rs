use crate::common::error::{
    Error::{
        CreatePod, DeletePod, GetDeployment, GetPod, ListPodsWithLabel, MissingMetadata,
        UpdateDeployment,
    },
    Result,
};
use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, ResourceExt,
};

#[cfg(test)]
use mockall::automock;

/// The cluster object operations used by the upgrade and exec subsystem.
///
/// This trait allows mocking the Kubernetes client in tests while using the real client in
/// production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Lists the Pods matching a label selector, e.g. `dogu.name=ldap`.
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// Deletes a Pod. A missing Pod is reported as an error which answers `is_not_found()`.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// Replaces the Deployment with the given object.
    async fn update_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment>;
}

/// [`ClusterApi`] on top of a kube client.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace).get(name).await.map_err(|e| GetPod {
            source: e,
            pod_name: name.to_string(),
            pod_namespace: namespace.to_string(),
        })
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| ListPodsWithLabel {
                source: e,
                label: label_selector.to_string(),
                namespace: namespace.to_string(),
            })?;
        Ok(pods.items)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| CreatePod {
                source: e,
                pod_name: pod.name_any(),
                namespace: namespace.to_string(),
            })
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| DeletePod {
                source: e,
                pod_name: name.to_string(),
                namespace: namespace.to_string(),
            })?;
        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.deployments(namespace)
            .get(name)
            .await
            .map_err(|e| GetDeployment {
                source: e,
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        let name = deployment.metadata.name.clone().ok_or(MissingMetadata {
            kind: "Deployment",
            field: ".metadata.name",
        })?;
        self.deployments(namespace)
            .replace(&name, &PostParams::default(), deployment)
            .await
            .map_err(|e| UpdateDeployment {
                source: e,
                name: name.clone(),
                namespace: namespace.to_string(),
            })
    }
}
