use crate::{
    cluster::ClusterApi,
    common::{
        constants::{
            POST_UPGRADE_COMMAND, PRE_UPGRADE_COMMAND, RESERVED_VOLUME_MOUNT_PATH,
            UPGRADE_ERROR_EVENT_REASON, UPGRADE_EVENT_REASON,
        },
        error::Result,
        Error,
    },
    dogu::{Dogu, DoguDescriptor},
    exec::{
        CommandExecutor, ExecPod, ExecPodFactory, ExecPodGuard, FileExtractor, PodStatusGate,
        ShellCommand, VolumeMode,
    },
    k8s::event_helper::{EventKind, EventSink},
    retry::DeadlineRetry,
    upgrade::collaborators::{Collaborators, DeploymentPatch, ImageConfig},
};
use std::{fmt, future::Future, sync::Arc};
use tracing::{info, warn};

/// The steps of an upgrade, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradePhase {
    RegisterVersion,
    ServiceAccounts,
    PullImage,
    UpdateResources,
    PostUpgrade,
    RevertStartupProbe,
}

impl UpgradePhase {
    /// Prefix of the error returned when the phase fails.
    fn failure(&self) -> &'static str {
        match self {
            UpgradePhase::RegisterVersion => "failed to register upgrade",
            UpgradePhase::ServiceAccounts => "failed to create service accounts",
            UpgradePhase::PullImage => "failed to pull upgrade image",
            UpgradePhase::UpdateResources => "failed to update dogu resources",
            UpgradePhase::PostUpgrade => "post-upgrade failed",
            UpgradePhase::RevertStartupProbe => "failed to revert startup probe after upgrade",
        }
    }

    fn note(&self, to: &DoguDescriptor) -> String {
        match self {
            UpgradePhase::RegisterVersion => format!("Registering upgraded version {}...", to.version),
            UpgradePhase::ServiceAccounts => "Creating required service accounts...".to_string(),
            UpgradePhase::PullImage => format!("Pulling new image {}...", to.image_ref()),
            UpgradePhase::UpdateResources => "Updating dogu resources in the cluster...".to_string(),
            UpgradePhase::PostUpgrade => "Applying optional post-upgrade scripts...".to_string(),
            UpgradePhase::RevertStartupProbe => "Reverting to original startup probe values...".to_string(),
        }
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Carries out an upgrade whose premises were checked.
///
/// The phases run strictly in order and are not transactional: a failing phase leaves the
/// effects of the preceding ones in place.
#[derive(Clone)]
pub struct UpgradeExecutor {
    cluster: Arc<dyn ClusterApi>,
    collaborators: Collaborators,
    executor: CommandExecutor,
    exec_pods: ExecPodFactory,
    file_extractor: FileExtractor,
    image_pull: DeadlineRetry,
}

impl UpgradeExecutor {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        collaborators: Collaborators,
        executor: CommandExecutor,
        exec_pods: ExecPodFactory,
        image_pull: DeadlineRetry,
    ) -> Self {
        Self {
            cluster,
            collaborators,
            executor,
            exec_pods,
            file_extractor: FileExtractor::default(),
            image_pull,
        }
    }

    pub async fn upgrade(&self, resource: &Dogu, from: &DoguDescriptor, to: &DoguDescriptor) -> Result<()> {
        info!(
            dogu.name = %to.name,
            from = %from.version,
            to = %to.version,
            "Upgrading dogu"
        );

        self.run_phase(resource, to, UpgradePhase::RegisterVersion, async {
            self.collaborators.registry.register_version(to).await
        })
        .await?;

        self.run_phase(resource, to, UpgradePhase::ServiceAccounts, async {
            self.collaborators.service_accounts.create_all(to).await
        })
        .await?;

        let image = self
            .run_phase(resource, to, UpgradePhase::PullImage, self.pull_image(to))
            .await?;

        self.run_phase(
            resource,
            to,
            UpgradePhase::UpdateResources,
            self.update_resources(resource, from, to, &image),
        )
        .await?;

        if to.has_exposed_command(POST_UPGRADE_COMMAND) {
            self.run_phase(
                resource,
                to,
                UpgradePhase::PostUpgrade,
                self.post_upgrade(resource, from, to),
            )
            .await?;
        }

        self.run_phase(
            resource,
            to,
            UpgradePhase::RevertStartupProbe,
            self.revert_startup_probe(resource),
        )
        .await?;

        info!(dogu.name = %to.name, version = %to.version, "Dogu upgraded");
        Ok(())
    }

    async fn run_phase<T>(
        &self,
        resource: &Dogu,
        to: &DoguDescriptor,
        phase: UpgradePhase,
        step: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        info!(dogu.name = %to.name, %phase, "Running upgrade phase");
        self.publish(resource, phase.note(to)).await;

        step.await.map_err(Error::upgrade(phase.failure()))
    }

    async fn publish(&self, resource: &Dogu, note: String) {
        self.collaborators
            .events
            .publish(resource, EventKind::Normal, UPGRADE_EVENT_REASON, note)
            .await;
    }

    async fn pull_image(&self, to: &DoguDescriptor) -> Result<ImageConfig> {
        let image_ref = to.image_ref();
        let (images, image_ref) = (&self.collaborators.images, &image_ref);
        self.image_pull
            .run("pull image config", move || images.pull_config(image_ref))
            .await
    }

    async fn update_resources(
        &self,
        resource: &Dogu,
        from: &DoguDescriptor,
        to: &DoguDescriptor,
        image: &ImageConfig,
    ) -> Result<()> {
        let upserter = &self.collaborators.upserter;
        upserter
            .upsert_service(resource, image)
            .await
            .map_err(Error::upgrade("failed to upsert service"))?;
        upserter
            .upsert_exposed_services(resource, to)
            .await
            .map_err(Error::upgrade("failed to upsert exposed services"))?;

        let exec_pod = ExecPodGuard::new(self.exec_pods.exec_pod(resource, to, VolumeMode::Upgrade));
        let result = self
            .update_resources_with_exec_pod(&exec_pod, resource, from, to)
            .await;
        self.delete_exec_pod(resource, exec_pod).await;

        result
    }

    async fn update_resources_with_exec_pod(
        &self,
        exec_pod: &ExecPod,
        resource: &Dogu,
        from: &DoguDescriptor,
        to: &DoguDescriptor,
    ) -> Result<()> {
        exec_pod
            .create()
            .await
            .map_err(Error::upgrade("failed to create ExecPod"))?;

        if to.has_exposed_command(PRE_UPGRADE_COMMAND) {
            self.pre_upgrade(exec_pod, resource, from, to)
                .await
                .map_err(Error::upgrade("pre-upgrade failed"))?;
        }

        self.publish(resource, "Extracting optional custom K8s resources...".to_string())
            .await;
        let manifests = self
            .file_extractor
            .extract(exec_pod)
            .await
            .map_err(Error::upgrade("failed to extract custom resources"))?;
        if !manifests.is_empty() {
            let names: Vec<&str> = manifests.keys().map(String::as_str).collect();
            self.publish(
                resource,
                format!("Applying/Updating custom dogu resources to the cluster: [{}]", names.join(", ")),
            )
            .await;
        }
        self.collaborators
            .applier
            .collect_apply(&manifests, resource)
            .await
            .map_err(Error::upgrade("failed to apply custom resources"))?;

        let upserter = &self.collaborators.upserter;
        upserter
            .upsert_deployment(resource, to, &DeploymentPatch::upgrade())
            .await
            .map_err(Error::upgrade("failed to upsert deployment"))?;
        upserter
            .upsert_pvcs(resource, to)
            .await
            .map_err(Error::upgrade("failed to upsert volume claims"))
    }

    /// Copies the pre-upgrade script of the new image to the reserved volume and runs the copy
    /// in the Pod of the old version.
    async fn pre_upgrade(
        &self,
        exec_pod: &ExecPod,
        resource: &Dogu,
        from: &DoguDescriptor,
        to: &DoguDescriptor,
    ) -> Result<()> {
        let script = &to.exposed_command(PRE_UPGRADE_COMMAND)?.command;
        let file_name = script.rsplit('/').next().unwrap_or(script);
        let copied = format!("{}/{}", RESERVED_VOLUME_MOUNT_PATH, file_name);

        self.publish(resource, "Copying optional pre-upgrade scripts...".to_string())
            .await;
        exec_pod
            .exec(&ShellCommand::new("/bin/cp", [script.as_str(), copied.as_str()]))
            .await?;

        self.publish(resource, "Applying optional pre-upgrade scripts...".to_string())
            .await;
        let output = self
            .executor
            .exec_in_dogu(
                resource,
                &from.version,
                &ShellCommand::new(copied, [from.version.as_str(), to.version.as_str()]),
                PodStatusGate::PodReady,
            )
            .await?;
        info!(dogu.name = %to.name, %output, "Pre-upgrade script finished");

        Ok(())
    }

    async fn post_upgrade(&self, resource: &Dogu, from: &DoguDescriptor, to: &DoguDescriptor) -> Result<()> {
        let script = &to.exposed_command(POST_UPGRADE_COMMAND)?.command;
        let output = self
            .executor
            .exec_in_dogu(
                resource,
                &to.version,
                &ShellCommand::new(script.as_str(), [from.version.as_str(), to.version.as_str()]),
                PodStatusGate::ContainersStarted,
            )
            .await?;
        info!(dogu.name = %to.name, %output, "Post-upgrade script finished");

        Ok(())
    }

    async fn revert_startup_probe(&self, resource: &Dogu) -> Result<()> {
        let namespace = resource.namespace_or_default();
        let mut deployment = self
            .cluster
            .get_deployment(&namespace, resource.simple_name())
            .await?;
        DeploymentPatch::regular().apply(&mut deployment)?;
        self.cluster.update_deployment(&namespace, &deployment).await?;

        Ok(())
    }

    /// Cleanup failures are reported, never returned.
    async fn delete_exec_pod(&self, resource: &Dogu, exec_pod: ExecPodGuard) {
        let (pod_name, key) = (exec_pod.pod_name().to_string(), exec_pod.object_key());
        if let Err(error) = exec_pod.release().await {
            warn!(pod.name = %pod_name, %error, "Failed to delete ExecPod");
            self.collaborators
                .events
                .publish(
                    resource,
                    EventKind::Warning,
                    UPGRADE_ERROR_EVENT_REASON,
                    format!("Failed to delete execPod {}: {}", key, error),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::MockClusterApi,
        common::error::internal_error,
        dogu::{resource::dogu_resource, ExposedCommand},
        exec::{
            exec_pod::tests::{deletions_reach, descriptor},
            executor::tests::fast_retry,
            gate::pod_with_status,
            transport::MockPodExec,
            TransientErrorPredicate,
        },
        k8s::event_helper::MockEventSink,
        retry::RetryPolicy,
        upgrade::collaborators::{
            deployment_with_startup_probe, startup_probe_threshold, MockCollectApplier,
            MockDependencyValidator, MockDoguRegistry, MockImageRegistry, MockResourceUpserter,
            MockServiceAccountCreator,
        },
    };
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Mutex,
        },
        time::Duration,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn from_descriptor() -> DoguDescriptor {
        descriptor("official/ldap", "2.4.48-4")
    }

    fn to_descriptor() -> DoguDescriptor {
        let mut to = descriptor("official/ldap", "2.4.49-1");
        to.exposed_commands = vec![
            ExposedCommand {
                name: PRE_UPGRADE_COMMAND.to_string(),
                command: "/pre-upgrade.sh".to_string(),
            },
            ExposedCommand {
                name: POST_UPGRADE_COMMAND.to_string(),
                command: "/post-upgrade.sh".to_string(),
            },
        ];
        to
    }

    /// Cluster where every Pod runs ready; records Pod creation, deletion and Deployment updates.
    fn cluster(log: &Log) -> MockClusterApi {
        let mut cluster = MockClusterApi::new();
        let l = log.clone();
        cluster.expect_create_pod().returning(move |_, pod| {
            record(&l, "create execpod");
            Ok(pod.clone())
        });
        cluster
            .expect_get_pod()
            .returning(|_, name| Ok(pod_with_status(name, "Running", true)));
        cluster.expect_list_pods().returning(|_, selector| {
            let version = selector.rsplit('=').next().unwrap_or_default();
            Ok(vec![pod_with_status(&format!("ldap-{version}"), "Running", true)])
        });
        let l = log.clone();
        cluster.expect_delete_pod().returning(move |_, _| {
            record(&l, "delete execpod");
            Ok(())
        });
        cluster
            .expect_get_deployment()
            .returning(|_, name| Ok(deployment_with_startup_probe(name, 1080)));
        let l = log.clone();
        cluster.expect_update_deployment().returning(move |_, deployment| {
            record(
                &l,
                format!("update deployment threshold={:?}", startup_probe_threshold(deployment)),
            );
            Ok(deployment.clone())
        });
        cluster
    }

    /// Exec transport which records every command by Pod.
    fn transport(log: &Log) -> MockPodExec {
        let mut transport = MockPodExec::new();
        let l = log.clone();
        transport.expect_exec().returning(move |target, command| {
            let pod = if target.pod_name.contains("-execpod-") {
                "execpod"
            } else {
                target.pod_name.as_str()
            };
            if command.command() == "/bin/bash" {
                return Ok("total 0\n".to_string());
            }
            record(&l, format!("exec {pod}: {command}"));
            Ok(String::new())
        });
        transport
    }

    struct Fixture {
        cluster: MockClusterApi,
        transport: MockPodExec,
        registry: MockDoguRegistry,
        images: MockImageRegistry,
        service_accounts: MockServiceAccountCreator,
        upserter: MockResourceUpserter,
        applier: MockCollectApplier,
        events: MockEventSink,
        retry: RetryPolicy,
    }

    impl Fixture {
        fn new(log: &Log) -> Self {
            let mut registry = MockDoguRegistry::new();
            let l = log.clone();
            registry.expect_register_version().returning(move |d| {
                record(&l, format!("register {}", d.version));
                Ok(())
            });
            let mut service_accounts = MockServiceAccountCreator::new();
            let l = log.clone();
            service_accounts.expect_create_all().returning(move |_| {
                record(&l, "create service accounts");
                Ok(())
            });
            let mut images = MockImageRegistry::new();
            let l = log.clone();
            images.expect_pull_config().returning(move |image| {
                record(&l, format!("pull {image}"));
                Ok(ImageConfig::default())
            });
            let mut upserter = MockResourceUpserter::new();
            let l = log.clone();
            upserter.expect_upsert_service().returning(move |_, _| {
                record(&l, "upsert service");
                Ok(())
            });
            let l = log.clone();
            upserter.expect_upsert_exposed_services().returning(move |_, _| {
                record(&l, "upsert exposed services");
                Ok(())
            });
            let l = log.clone();
            upserter.expect_upsert_deployment().returning(move |_, _, patch| {
                record(
                    &l,
                    format!("upsert deployment threshold={}", patch.startup_probe_failure_threshold),
                );
                Ok(())
            });
            let l = log.clone();
            upserter.expect_upsert_pvcs().returning(move |_, _| {
                record(&l, "upsert pvcs");
                Ok(())
            });
            let mut applier = MockCollectApplier::new();
            let l = log.clone();
            applier.expect_collect_apply().returning(move |manifests, _| {
                record(&l, format!("apply {} manifests", manifests.len()));
                Ok(())
            });
            let mut events = MockEventSink::new();
            events.expect_publish().returning(|_, _, _, _| ());

            Self {
                cluster: cluster(log),
                transport: transport(log),
                registry,
                images,
                service_accounts,
                upserter,
                applier,
                events,
                retry: fast_retry(3),
            }
        }

        fn build(self) -> UpgradeExecutor {
            let cluster: Arc<dyn ClusterApi> = Arc::new(self.cluster);
            let executor = CommandExecutor::new(
                cluster.clone(),
                Arc::new(self.transport),
                self.retry,
                TransientErrorPredicate::default(),
            );
            let exec_pods = ExecPodFactory::new(cluster.clone(), executor.clone(), self.retry);
            let collaborators = Collaborators {
                registry: Arc::new(self.registry),
                images: Arc::new(self.images),
                service_accounts: Arc::new(self.service_accounts),
                upserter: Arc::new(self.upserter),
                applier: Arc::new(self.applier),
                dependency_validator: Arc::new(MockDependencyValidator::new()),
                events: Arc::new(self.events),
            };
            UpgradeExecutor::new(
                cluster,
                collaborators,
                executor,
                exec_pods,
                DeadlineRetry::new(Duration::from_secs(5), Duration::ZERO),
            )
        }
    }

    #[tokio::test]
    async fn runs_all_phases_in_order() {
        let log: Log = Default::default();
        let resource = dogu_resource("official/ldap", "2.4.49-1");

        Fixture::new(&log)
            .build()
            .upgrade(&resource, &from_descriptor(), &to_descriptor())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "register 2.4.49-1",
                "create service accounts",
                "pull registry.cloudogu.com/official/ldap:2.4.49-1",
                "upsert service",
                "upsert exposed services",
                "create execpod",
                "exec execpod: /bin/cp /pre-upgrade.sh /tmp/dogu-reserved/pre-upgrade.sh",
                "exec ldap-2.4.48-4: /tmp/dogu-reserved/pre-upgrade.sh 2.4.48-4 2.4.49-1",
                "apply 0 manifests",
                "upsert deployment threshold=1080",
                "upsert pvcs",
                "delete execpod",
                "exec ldap-2.4.49-1: /post-upgrade.sh 2.4.48-4 2.4.49-1",
                "update deployment threshold=Some(3)",
            ]
        );
    }

    #[tokio::test]
    async fn scripts_are_optional() {
        let log: Log = Default::default();
        let resource = dogu_resource("official/ldap", "2.4.49-1");
        let to = descriptor("official/ldap", "2.4.49-1");

        Fixture::new(&log)
            .build()
            .upgrade(&resource, &from_descriptor(), &to)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert!(!log.iter().any(|entry| entry.starts_with("exec ")));
        assert_eq!(log.last().map(String::as_str), Some("update deployment threshold=Some(3)"));
    }

    #[tokio::test]
    async fn image_pull_is_retried_until_it_succeeds() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        let pulls = Arc::new(AtomicU32::new(0));
        let p = pulls.clone();
        fixture.images = MockImageRegistry::new();
        fixture.images.expect_pull_config().returning(move |_| {
            if p.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Collaborator {
                    operation: "pull image config".to_string(),
                    source: "registry unreachable".into(),
                })
            } else {
                Ok(ImageConfig::default())
            }
        });

        fixture
            .build()
            .upgrade(&dogu_resource("official/ldap", "2.4.49-1"), &from_descriptor(), &to_descriptor())
            .await
            .unwrap();

        assert_eq!(pulls.load(Ordering::SeqCst), 3);
        assert!(log.lock().unwrap().contains(&"upsert service".to_string()));
    }

    #[tokio::test]
    async fn failed_registration_stops_the_upgrade() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        fixture.registry = MockDoguRegistry::new();
        fixture.registry.expect_register_version().returning(|_| {
            Err(Error::Collaborator {
                operation: "register dogu".to_string(),
                source: "etcd unavailable".into(),
            })
        });

        let err = fixture
            .build()
            .upgrade(&dogu_resource("official/ldap", "2.4.49-1"), &from_descriptor(), &to_descriptor())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("failed to register upgrade: "));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exec_pod_is_deleted_when_pre_upgrade_fails() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        fixture.transport = MockPodExec::new();
        let l = log.clone();
        fixture.transport.expect_exec().returning(move |target, command| {
            if target.pod_name.contains("-execpod-") {
                record(&l, format!("exec execpod: {command}"));
                Ok(String::new())
            } else {
                Err(Error::ExecCommandFailed {
                    pod_name: target.pod_name.clone(),
                    command: command.to_string(),
                    message: "command terminated with non-zero exit code".to_string(),
                    stderr: "migration failed".to_string(),
                })
            }
        });

        let err = fixture
            .build()
            .upgrade(&dogu_resource("official/ldap", "2.4.49-1"), &from_descriptor(), &to_descriptor())
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("failed to update dogu resources: pre-upgrade failed: "));
        assert!(message.contains("migration failed"));
        let log = log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("delete execpod"));
        assert!(!log.iter().any(|entry| entry.starts_with("upsert deployment")));
    }

    #[tokio::test]
    async fn exec_pod_deletion_failure_is_only_reported() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        let mut failing = MockClusterApi::new();
        failing
            .expect_create_pod()
            .returning(|_, pod| Ok(pod.clone()));
        failing
            .expect_get_pod()
            .returning(|_, name| Ok(pod_with_status(name, "Running", true)));
        failing.expect_list_pods().returning(|_, selector| {
            let version = selector.rsplit('=').next().unwrap_or_default();
            Ok(vec![pod_with_status(&format!("ldap-{version}"), "Running", true)])
        });
        failing.expect_delete_pod().returning(|namespace, name| {
            Err(Error::DeletePod {
                source: internal_error("etcdserver: request timed out"),
                pod_name: name.to_string(),
                namespace: namespace.to_string(),
            })
        });
        failing
            .expect_get_deployment()
            .returning(|_, name| Ok(deployment_with_startup_probe(name, 1080)));
        failing
            .expect_update_deployment()
            .returning(|_, deployment| Ok(deployment.clone()));
        fixture.cluster = failing;

        let warnings = Arc::new(AtomicU32::new(0));
        let w = warnings.clone();
        fixture.events = MockEventSink::new();
        fixture.events.expect_publish().returning(move |_, kind, reason, note| {
            if kind == EventKind::Warning {
                assert_eq!(reason, UPGRADE_ERROR_EVENT_REASON);
                assert!(note.contains("request timed out"));
                w.fetch_add(1, Ordering::SeqCst);
            }
        });

        fixture
            .build()
            .upgrade(&dogu_resource("official/ldap", "2.4.49-1"), &from_descriptor(), &to_descriptor())
            .await
            .unwrap();
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_upgrade_deletes_exec_pod() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        let deleted = Arc::new(AtomicU32::new(0));
        let mut cluster = MockClusterApi::new();
        let l = log.clone();
        cluster.expect_create_pod().returning(move |_, pod| {
            record(&l, "create execpod");
            Ok(pod.clone())
        });
        // Containers run but never become ready, so the pre-upgrade script waits forever.
        cluster
            .expect_get_pod()
            .returning(|_, name| Ok(pod_with_status(name, "Running", false)));
        cluster.expect_list_pods().returning(|_, selector| {
            let version = selector.rsplit('=').next().unwrap_or_default();
            Ok(vec![pod_with_status(&format!("ldap-{version}"), "Running", false)])
        });
        let d = deleted.clone();
        cluster.expect_delete_pod().times(1).returning(move |_, name| {
            assert!(name.starts_with("ldap-execpod-"));
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        fixture.cluster = cluster;
        fixture.retry = RetryPolicy::new(u32::MAX, Duration::from_millis(5));

        let executor = fixture.build();
        let resource = dogu_resource("official/ldap", "2.4.49-1");
        let (from, to) = (from_descriptor(), to_descriptor());
        let started = tokio::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            executor.upgrade(&resource, &from, &to),
        )
        .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        deletions_reach(&deleted, 1).await;
        let log = log.lock().unwrap();
        assert!(log.contains(&"exec execpod: /bin/cp /pre-upgrade.sh /tmp/dogu-reserved/pre-upgrade.sh".to_string()));
        assert!(!log.iter().any(|entry| entry.starts_with("upsert deployment")));
    }

    #[tokio::test]
    async fn every_phase_is_announced() {
        let log: Log = Default::default();
        let mut fixture = Fixture::new(&log);
        let notes: Log = Default::default();
        let n = notes.clone();
        fixture.events = MockEventSink::new();
        fixture.events.expect_publish().returning(move |_, kind, reason, note| {
            assert_eq!(kind, EventKind::Normal);
            assert_eq!(reason, UPGRADE_EVENT_REASON);
            record(&n, note);
        });

        fixture
            .build()
            .upgrade(&dogu_resource("official/ldap", "2.4.49-1"), &from_descriptor(), &to_descriptor())
            .await
            .unwrap();

        let notes = notes.lock().unwrap();
        assert_eq!(notes.first().map(String::as_str), Some("Registering upgraded version 2.4.49-1..."));
        assert!(notes.contains(&"Copying optional pre-upgrade scripts...".to_string()));
        assert!(notes.contains(&"Applying optional post-upgrade scripts...".to_string()));
        assert_eq!(
            notes.last().map(String::as_str),
            Some("Reverting to original startup probe values...")
        );
    }
}
