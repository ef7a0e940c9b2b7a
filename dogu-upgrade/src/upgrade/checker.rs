use crate::{
    common::error::{
        Error::{Downgrade, GetCurrentDescriptor},
        Result,
    },
    dogu::{Dogu, DoguDescriptor, Version},
    upgrade::collaborators::DoguRegistry,
};
use std::sync::Arc;
use tracing::debug;

/// Decides whether a Dogu resource asks for an upgrade of the installed dogu.
#[derive(Clone)]
pub struct UpgradeChecker {
    registry: Arc<dyn DoguRegistry>,
}

impl UpgradeChecker {
    pub fn new(registry: Arc<dyn DoguRegistry>) -> Self {
        Self { registry }
    }

    /// True iff the desired version is strictly newer than the installed one.
    pub async fn is_upgrade(&self, resource: &Dogu) -> Result<bool> {
        let name = resource.simple_name();
        let installed = self
            .registry
            .get_current(name)
            .await
            .map_err(|e| GetCurrentDescriptor {
                name: name.to_string(),
                source: Box::new(e),
            })?;

        let desired = Version::parse(&resource.spec.version)?;
        let current = installed.parsed_version()?;
        debug!(
            dogu.name = %resource.spec.name,
            installed = %current,
            desired = %desired,
            "Compared dogu versions"
        );

        Ok(desired.is_newer_than(&current))
    }
}

/// Rejects version transitions which are not upgrades.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpgradeabilityChecker;

impl UpgradeabilityChecker {
    /// Succeeds if `to` is strictly newer than `from`, or unconditionally if `force` is set.
    pub fn check(&self, from: &DoguDescriptor, to: &DoguDescriptor, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }

        let from_version = from.parsed_version()?;
        let to_version = to.parsed_version()?;
        if to_version.is_newer_than(&from_version) {
            Ok(())
        } else {
            Err(Downgrade {
                dogu: to.name.clone(),
                from: from.version.clone(),
                to: to.version.clone(),
            })
        }
    }
}
