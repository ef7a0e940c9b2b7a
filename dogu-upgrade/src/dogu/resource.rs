use crate::common::constants::{DOGU_NAME_LABEL, DOGU_VERSION_LABEL};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a dogu in the cluster.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k8s.cloudogu.com",
    version = "v1",
    kind = "Dogu",
    namespaced,
    status = "DoguStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DoguSpec {
    /// Qualified dogu name, e.g. `official/ldap`.
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub upgrade_config: DoguUpgradeConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoguUpgradeConfig {
    /// Allows the dogu namespace to change during an upgrade, e.g. `premium/ldap` to
    /// `official/ldap`.
    #[serde(default)]
    pub allow_namespace_switch: bool,
    /// Allows upgrading to a version which is not newer than the installed one.
    #[serde(default)]
    pub force_upgrade: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoguStatus {
    #[serde(default)]
    pub status: String,
}

impl Dogu {
    /// Simple name of the desired dogu, e.g. `ldap` for `official/ldap`. Doubles as the name of
    /// its Deployment.
    pub fn simple_name(&self) -> &str {
        self.spec
            .name
            .rsplit_once('/')
            .map(|(_, simple)| simple)
            .unwrap_or(&self.spec.name)
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Label selector which matches the Pods of this dogu running the given version.
    pub fn pod_selector(&self, version: &str) -> String {
        format!(
            "{}={},{}={}",
            DOGU_NAME_LABEL,
            self.simple_name(),
            DOGU_VERSION_LABEL,
            version
        )
    }

    pub fn allows_namespace_switch(&self) -> bool {
        self.spec.upgrade_config.allow_namespace_switch
    }

    pub fn forces_upgrade(&self) -> bool {
        self.spec.upgrade_config.force_upgrade
    }
}

#[cfg(test)]
pub(crate) fn dogu_resource(name: &str, version: &str) -> Dogu {
    let mut dogu = Dogu::new(
        name.rsplit_once('/').map(|(_, n)| n).unwrap_or(name),
        DoguSpec {
            name: name.to_string(),
            version: version.to_string(),
            upgrade_config: DoguUpgradeConfig::default(),
        },
    );
    dogu.metadata.namespace = Some("ecosystem".to_string());
    dogu.metadata.uid = Some("5f1d0b4e-9a56-4a3e-a7a2-2f2f4d8f1a11".to_string());
    dogu
}
