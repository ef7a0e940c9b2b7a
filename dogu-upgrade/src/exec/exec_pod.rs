use crate::{
    cluster::ClusterApi,
    common::{
        constants::{
            EXEC_POD_COMMAND, EXEC_POD_COMPONENT_LABEL, EXEC_POD_DOGU_LABEL, EXEC_POD_NAME_INFIX,
            EXEC_POD_SUFFIX_LEN, RESERVED_VOLUME_CLAIM_SUFFIX, RESERVED_VOLUME_MOUNT_PATH,
            RESERVED_VOLUME_NAME,
        },
        error::{
            Error::{ExecPodNotRunning, ExecPodStart, ExecPodTerminated, OwnerReference},
            Result,
        },
        Error,
    },
    dogu::{Dogu, DoguDescriptor},
    exec::{command::ShellCommand, executor::CommandExecutor, gate::PodStatusGate},
    retry::RetryPolicy,
};
use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{
        Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeMount,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::Resource;
use rand::{distributions::Alphanumeric, Rng};
use std::{
    collections::BTreeMap,
    fmt, mem,
    ops::Deref,
    sync::{Arc, Mutex},
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

/// Something commands can be executed in.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandTarget: Send + Sync {
    async fn exec(&self, command: &ShellCommand) -> Result<String>;
}

/// Whether the reserved data volume of the dogu is mounted into the ExecPod.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeMode {
    /// Nothing is mounted; the dogu does not exist yet.
    Install,
    /// The reserved data volume is mounted read-write, so files can be handed to the running
    /// dogu.
    Upgrade,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A short-lived Pod which runs the image of a given dogu version and serves as exec target.
///
/// An ExecPod is created once, used for any number of commands and deleted by its creator.
/// It is never reused for another operation.
#[derive(Clone)]
pub struct ExecPod {
    name: String,
    namespace: String,
    resource: Dogu,
    descriptor: DoguDescriptor,
    mode: VolumeMode,
    cluster: Arc<dyn ClusterApi>,
    executor: CommandExecutor,
    retry: RetryPolicy,
}

impl ExecPod {
    pub fn pod_name(&self) -> &str {
        &self.name
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Creates the Pod and blocks until it is running.
    pub async fn create(&self) -> Result<()> {
        let pod = self.manifest()?;
        self.cluster.create_pod(&self.namespace, &pod).await?;
        info!(
            pod.name = %self.name,
            image = %self.descriptor.image_ref(),
            "Created ExecPod"
        );

        self.wait_until_running().await.map_err(|e| ExecPodStart {
            pod_name: self.name.clone(),
            source: Box::new(e),
        })
    }

    /// Executes the command in the ExecPod once its containers started.
    pub async fn exec(&self, command: &ShellCommand) -> Result<String> {
        let pod = self.cluster.get_pod(&self.namespace, &self.name).await?;
        self.executor
            .exec_in_pod(&pod, command, PodStatusGate::ContainersStarted)
            .await
    }

    /// Deletes the Pod. A Pod which is already gone counts as deleted.
    pub async fn delete(&self) -> Result<()> {
        match self.cluster.delete_pod(&self.namespace, &self.name).await {
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
            Ok(()) => {
                info!(pod.name = %self.name, "Deleted ExecPod");
                Ok(())
            }
        }
    }

    async fn wait_until_running(&self) -> Result<()> {
        let (cluster, namespace, name) = (&self.cluster, &self.namespace, &self.name);

        self.retry
            .run(
                "wait for ExecPod",
                |error| !matches!(error, Error::ExecPodTerminated { .. }),
                move || async move {
                    let pod = cluster.get_pod(namespace, name).await?;
                    let phase = pod
                        .status
                        .and_then(|status| status.phase)
                        .unwrap_or_default();
                    match phase.as_str() {
                        "Running" => Ok(()),
                        "Failed" | "Succeeded" => Err(ExecPodTerminated {
                            pod_name: name.clone(),
                            phase,
                        }),
                        _ => Err(ExecPodNotRunning {
                            pod_name: name.clone(),
                            phase,
                        }),
                    }
                },
            )
            .await
    }

    fn manifest(&self) -> Result<Pod> {
        let owner = self
            .resource
            .controller_owner_ref(&())
            .ok_or_else(|| OwnerReference {
                dogu: self.resource.spec.name.clone(),
            })?;
        let simple_name = self.descriptor.simple_name().to_string();

        let labels = BTreeMap::from([
            (EXEC_POD_DOGU_LABEL.to_string(), simple_name.clone()),
            (
                EXEC_POD_COMPONENT_LABEL.0.to_string(),
                EXEC_POD_COMPONENT_LABEL.1.to_string(),
            ),
        ]);

        let (volumes, volume_mounts) = match self.mode {
            VolumeMode::Install => (None, None),
            VolumeMode::Upgrade => (
                Some(vec![Volume {
                    name: RESERVED_VOLUME_NAME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: format!("{}-{}", simple_name, RESERVED_VOLUME_CLAIM_SUFFIX),
                        read_only: Some(false),
                    }),
                    ..Default::default()
                }]),
                Some(vec![VolumeMount {
                    name: RESERVED_VOLUME_NAME.to_string(),
                    mount_path: RESERVED_VOLUME_MOUNT_PATH.to_string(),
                    read_only: Some(false),
                    ..Default::default()
                }]),
            ),
        };

        Ok(Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: simple_name,
                    image: Some(self.descriptor.image_ref()),
                    image_pull_policy: Some("IfNotPresent".to_string()),
                    command: Some(EXEC_POD_COMMAND.iter().map(ToString::to_string).collect()),
                    volume_mounts,
                    ..Default::default()
                }],
                volumes,
                ..Default::default()
            }),
            status: None,
        })
    }
}

#[async_trait]
impl CommandTarget for ExecPod {
    async fn exec(&self, command: &ShellCommand) -> Result<String> {
        ExecPod::exec(self, command).await
    }
}

/// Deletions started by dropped [`ExecPodGuard`]s which have not been awaited yet.
static PENDING_DELETIONS: Mutex<Vec<JoinHandle<()>>> = Mutex::new(Vec::new());

/// Owns an ExecPod for the duration of an operation.
///
/// [`ExecPodGuard::release`] deletes the Pod. A guard dropped before that, because its
/// operation was cancelled or panicked, spawns the deletion on the current runtime instead.
pub struct ExecPodGuard {
    exec_pod: ExecPod,
    released: bool,
}

impl ExecPodGuard {
    pub fn new(exec_pod: ExecPod) -> Self {
        Self {
            exec_pod,
            released: false,
        }
    }

    /// Deletes the Pod now.
    pub async fn release(mut self) -> Result<()> {
        let result = self.exec_pod.delete().await;
        self.released = true;
        result
    }
}

impl Deref for ExecPodGuard {
    type Target = ExecPod;

    fn deref(&self) -> &ExecPod {
        &self.exec_pod
    }
}

impl Drop for ExecPodGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(pod.name = %self.exec_pod.name, "No runtime left to delete ExecPod");
                return;
            }
        };

        let exec_pod = self.exec_pod.clone();
        let deletion = runtime.spawn(async move {
            if let Err(error) = exec_pod.delete().await {
                warn!(pod.name = %exec_pod.name, %error, "Failed to delete abandoned ExecPod");
            }
        });
        if let Ok(mut pending) = PENDING_DELETIONS.lock() {
            pending.retain(|handle| !handle.is_finished());
            pending.push(deletion);
        }
    }
}

/// Waits for the deletions spawned by dropped guards. Call before the process exits.
pub async fn wait_for_abandoned_exec_pods() {
    let pending = match PENDING_DELETIONS.lock() {
        Ok(mut pending) => mem::take(&mut *pending),
        Err(_) => return,
    };
    for deletion in pending {
        if let Err(error) = deletion.await {
            warn!(%error, "ExecPod deletion did not finish");
        }
    }
}

/// Builds ExecPods which share the cluster access, executor and retry policy.
#[derive(Clone)]
pub struct ExecPodFactory {
    cluster: Arc<dyn ClusterApi>,
    executor: CommandExecutor,
    retry: RetryPolicy,
}

impl ExecPodFactory {
    pub fn new(cluster: Arc<dyn ClusterApi>, executor: CommandExecutor, retry: RetryPolicy) -> Self {
        Self {
            cluster,
            executor,
            retry,
        }
    }

    /// A new, not yet created ExecPod for the image of `descriptor`, owned by `resource`.
    pub fn exec_pod(&self, resource: &Dogu, descriptor: &DoguDescriptor, mode: VolumeMode) -> ExecPod {
        ExecPod {
            name: exec_pod_name(descriptor.simple_name()),
            namespace: resource.namespace_or_default(),
            resource: resource.clone(),
            descriptor: descriptor.clone(),
            mode,
            cluster: self.cluster.clone(),
            executor: self.executor.clone(),
            retry: self.retry,
        }
    }
}

fn exec_pod_name(simple_name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(EXEC_POD_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", simple_name, EXEC_POD_NAME_INFIX, suffix)
}
