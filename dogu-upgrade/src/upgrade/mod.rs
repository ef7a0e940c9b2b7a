use crate::{
    cluster::ClusterApi,
    common::{
        constants::{UPGRADE_ERROR_EVENT_REASON, UPGRADE_EVENT_REASON},
        error::{Error::GetCurrentDescriptor, Result},
    },
    dogu::{Dogu, DoguDescriptor},
    exec::{CommandExecutor, ExecPodFactory, PodExec, TransientErrorPredicate},
    k8s::event_helper::EventKind,
    retry::{DeadlineRetry, RetryPolicy},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Version gates: is the resource asking for an upgrade, and is it allowed.
pub mod checker;

/// Interfaces of the collaborators outside of this crate.
pub mod collaborators;

/// The upgrade state machine.
pub mod executor;

/// Dogu health, judged by the Deployment.
pub mod health;

/// Preconditions of an upgrade.
pub mod premises;

pub use checker::{UpgradeChecker, UpgradeabilityChecker};
pub use collaborators::Collaborators;
pub use executor::{UpgradeExecutor, UpgradePhase};
pub use health::{DoguHealthCheck, DoguHealthChecker};
pub use premises::PremisesChecker;

/// Retry tunables shared by all components of an upgrade.
#[derive(Clone, Debug, Default)]
pub struct Tunables {
    pub retry: RetryPolicy,
    pub image_pull: DeadlineRetry,
    pub transient: TransientErrorPredicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The desired version is already installed, or older and not forced.
    NotRequired,
    Upgraded,
}

/// Runs an upgrade end to end: the version gate, the premises, then the executor.
#[derive(Clone)]
pub struct DoguUpgrader {
    collaborators: Collaborators,
    checker: UpgradeChecker,
    upgradeability: UpgradeabilityChecker,
    premises: PremisesChecker,
    executor: UpgradeExecutor,
}

impl DoguUpgrader {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        transport: Arc<dyn PodExec>,
        collaborators: Collaborators,
        tunables: &Tunables,
    ) -> Self {
        let command_executor = CommandExecutor::new(
            cluster.clone(),
            transport,
            tunables.retry,
            tunables.transient.clone(),
        );
        let exec_pods =
            ExecPodFactory::new(cluster.clone(), command_executor.clone(), tunables.retry);
        let health = Arc::new(DoguHealthChecker::new(
            cluster.clone(),
            collaborators.registry.clone(),
        ));

        Self {
            checker: UpgradeChecker::new(collaborators.registry.clone()),
            upgradeability: UpgradeabilityChecker,
            premises: PremisesChecker::new(collaborators.dependency_validator.clone(), health),
            executor: UpgradeExecutor::new(
                cluster,
                collaborators.clone(),
                command_executor,
                exec_pods,
                tunables.image_pull,
            ),
            collaborators,
        }
    }

    /// Upgrades the installed dogu to `remote`, the descriptor of the version `resource` asks
    /// for. Failures are published as warning events on the resource before they are returned.
    pub async fn upgrade(&self, resource: &Dogu, remote: &DoguDescriptor) -> Result<UpgradeOutcome> {
        let result = self.try_upgrade(resource, remote).await;
        if let Err(error) = &result {
            self.collaborators
                .events
                .publish(
                    resource,
                    EventKind::Warning,
                    UPGRADE_ERROR_EVENT_REASON,
                    error.to_string(),
                )
                .await;
        }
        result
    }

    async fn try_upgrade(&self, resource: &Dogu, remote: &DoguDescriptor) -> Result<UpgradeOutcome> {
        let forced = resource.forces_upgrade();
        if !self.checker.is_upgrade(resource).await? && !forced {
            debug!(dogu.name = %resource.spec.name, "Desired version is not newer, skipping upgrade");
            return Ok(UpgradeOutcome::NotRequired);
        }

        let name = resource.simple_name();
        let local = self
            .collaborators
            .registry
            .get_current(name)
            .await
            .map_err(|e| GetCurrentDescriptor {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        if local.version == remote.version {
            return Ok(UpgradeOutcome::NotRequired);
        }
        self.upgradeability.check(&local, remote, forced)?;

        self.publish(resource, "Checking premises...").await;
        self.premises.check(resource, &local, remote).await?;

        self.publish(
            resource,
            &format!("Executing upgrade from {} to {}...", local.version, remote.version),
        )
        .await;
        self.executor.upgrade(resource, &local, remote).await?;

        info!(dogu.name = %remote.name, version = %remote.version, "Upgrade finished");
        Ok(UpgradeOutcome::Upgraded)
    }

    async fn publish(&self, resource: &Dogu, note: &str) {
        self.collaborators
            .events
            .publish(resource, EventKind::Normal, UPGRADE_EVENT_REASON, note.to_string())
            .await;
    }
}
