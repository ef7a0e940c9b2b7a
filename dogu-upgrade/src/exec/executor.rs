use crate::{
    cluster::ClusterApi,
    common::error::{
        Error::{NoPodForDogu, PodStatusMismatch, PodStatusWait},
        Result,
    },
    dogu::Dogu,
    exec::{
        command::ShellCommand,
        gate::{PodStatusGate, TransientErrorPredicate},
        transport::{ExecTarget, PodExec},
    },
    retry::{self, RetryPolicy},
};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, info};

/// Executes commands inside live Pods.
///
/// Before a command is streamed, the Pod has to fulfill the requested [`PodStatusGate`].
/// Streams which fail with a transient error signature are retried; every other streaming
/// error is returned as is.
#[derive(Clone)]
pub struct CommandExecutor {
    cluster: Arc<dyn ClusterApi>,
    transport: Arc<dyn PodExec>,
    retry: RetryPolicy,
    transient: TransientErrorPredicate,
}

impl CommandExecutor {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        transport: Arc<dyn PodExec>,
        retry: RetryPolicy,
        transient: TransientErrorPredicate,
    ) -> Self {
        Self {
            cluster,
            transport,
            retry,
            transient,
        }
    }

    /// Resolves the Pod of the dogu running `version` and executes the command in it.
    pub async fn exec_in_dogu(
        &self,
        resource: &Dogu,
        version: &str,
        command: &ShellCommand,
        required: PodStatusGate,
    ) -> Result<String> {
        let pod = self.dogu_pod(resource, version).await?;
        self.exec_in_pod(&pod, command, required).await
    }

    /// Executes the command in the Pod once it fulfills `required` and returns stdout.
    pub async fn exec_in_pod(
        &self,
        pod: &Pod,
        command: &ShellCommand,
        required: PodStatusGate,
    ) -> Result<String> {
        let target = ExecTarget::for_pod(pod)?;
        self.wait_for_pod_status(&target, required).await?;

        info!(pod.name = %target.pod_name, %command, "Executing command");
        let (target, transport, transient) = (&target, &self.transport, &self.transient);
        self.retry
            .run(
                "stream command",
                |error| transient.is_transient(error),
                move || transport.exec(target, command),
            )
            .await
    }

    /// Pod assignment lags behind the creation of the resource, so an empty result is retried.
    async fn dogu_pod(&self, resource: &Dogu, version: &str) -> Result<Pod> {
        let namespace = resource.namespace_or_default();
        let selector = resource.pod_selector(version);
        let dogu = resource.simple_name();
        let (namespace, selector, cluster) = (&namespace, &selector, &self.cluster);

        self.retry
            .run("resolve dogu pod", retry::always, move || async move {
                cluster
                    .list_pods(namespace, selector)
                    .await?
                    .into_iter()
                    .find(|pod| pod.metadata.deletion_timestamp.is_none())
                    .ok_or_else(|| NoPodForDogu {
                        dogu: dogu.to_string(),
                        selector: selector.clone(),
                        namespace: namespace.clone(),
                    })
            })
            .await
    }

    async fn wait_for_pod_status(&self, target: &ExecTarget, required: PodStatusGate) -> Result<()> {
        let cluster = &self.cluster;

        self.retry
            .run("wait for pod status", retry::always, move || async move {
                let pod = cluster.get_pod(&target.namespace, &target.pod_name).await?;
                if required.is_fulfilled_by(&pod) {
                    Ok(())
                } else {
                    debug!(pod.name = %target.pod_name, %required, "Pod status not fulfilled yet");
                    Err(PodStatusMismatch {
                        pod_name: target.pod_name.clone(),
                        expected: required,
                    })
                }
            })
            .await
            .map_err(|e| PodStatusWait {
                pod_name: target.pod_name.clone(),
                expected: required,
                source: Box::new(e),
            })
    }
}
