use crate::{
    common::error::{
        Error::{DependencyValidation, DoguNameMismatch, DoguNamespaceMismatch},
        Result,
    },
    dogu::{Dogu, DoguDescriptor},
    upgrade::{collaborators::DependencyValidator, health::DoguHealthCheck},
};
use std::sync::Arc;
use tracing::debug;

/// Verifies that an upgrade can start: the dogu keeps its identity, runs healthy, and its
/// dependencies are satisfied and healthy.
///
/// Health failures are marked requeueable; they usually resolve by themselves.
#[derive(Clone)]
pub struct PremisesChecker {
    dependency_validator: Arc<dyn DependencyValidator>,
    health: Arc<dyn DoguHealthCheck>,
}

impl PremisesChecker {
    pub fn new(
        dependency_validator: Arc<dyn DependencyValidator>,
        health: Arc<dyn DoguHealthCheck>,
    ) -> Self {
        Self {
            dependency_validator,
            health,
        }
    }

    /// Runs the checks in order and stops at the first failure.
    pub async fn check(
        &self,
        resource: &Dogu,
        local: &DoguDescriptor,
        remote: &DoguDescriptor,
    ) -> Result<()> {
        check_identity(resource, local, remote)?;

        self.health
            .check(resource)
            .await
            .map_err(|e| e.requeueable())?;

        self.dependency_validator
            .validate_dependencies(local)
            .await
            .map_err(|e| DependencyValidation {
                dogu: local.name.clone(),
                source: Box::new(e),
            })?;

        self.health
            .check_dependencies_recursive(local, &resource.namespace_or_default())
            .await
            .map_err(|e| e.requeueable())?;

        debug!(dogu.name = %resource.spec.name, "Upgrade premises fulfilled");
        Ok(())
    }
}

/// The simple names must match. The namespaces must match too, unless the resource allows a
/// namespace switch.
pub fn check_identity(resource: &Dogu, local: &DoguDescriptor, remote: &DoguDescriptor) -> Result<()> {
    if local.simple_name() != remote.simple_name() {
        return Err(DoguNameMismatch {
            local: local.name.clone(),
            remote: remote.name.clone(),
        });
    }
    if local.namespace() != remote.namespace() && !resource.allows_namespace_switch() {
        return Err(DoguNamespaceMismatch {
            local: local.name.clone(),
            remote: remote.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::Error,
        dogu::resource::dogu_resource,
        exec::exec_pod::tests::descriptor,
        upgrade::{collaborators::MockDependencyValidator, health::MockDoguHealthCheck},
    };

    fn unhealthy(dogu: &str) -> Error {
        Error::DoguNotHealthy {
            dogu: dogu.to_string(),
            namespace: "ecosystem".to_string(),
            ready: 0,
            desired: 1,
        }
    }

    #[test]
    fn identity_requires_same_name() {
        let resource = dogu_resource("official/ldap", "2.4.49-1");
        let err = check_identity(
            &resource,
            &descriptor("official/ldap", "2.4.48-4"),
            &descriptor("official/cas", "2.4.49-1"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DoguNameMismatch { .. }));
    }

    #[test]
    fn namespace_switch_needs_permission() {
        let mut resource = dogu_resource("official/ldap", "2.4.49-1");
        let local = descriptor("premium/ldap", "2.4.48-4");
        let remote = descriptor("official/ldap", "2.4.49-1");

        let err = check_identity(&resource, &local, &remote).unwrap_err();
        assert!(matches!(err, Error::DoguNamespaceMismatch { .. }));

        resource.spec.upgrade_config.allow_namespace_switch = true;
        check_identity(&resource, &local, &remote).unwrap();
    }

    #[tokio::test]
    async fn identity_failure_skips_health_checks() {
        let mut health = MockDoguHealthCheck::new();
        health.expect_check().never();
        health.expect_check_dependencies_recursive().never();
        let mut validator = MockDependencyValidator::new();
        validator.expect_validate_dependencies().never();

        let err = PremisesChecker::new(Arc::new(validator), Arc::new(health))
            .check(
                &dogu_resource("official/ldap", "2.4.49-1"),
                &descriptor("official/ldap", "2.4.48-4"),
                &descriptor("official/cas", "2.4.49-1"),
            )
            .await
            .unwrap_err();
        assert!(!err.requeue());
    }

    #[tokio::test]
    async fn unhealthy_dogu_is_requeued() {
        let mut health = MockDoguHealthCheck::new();
        health.expect_check().returning(|_| Err(unhealthy("ldap")));
        health.expect_check_dependencies_recursive().never();
        let mut validator = MockDependencyValidator::new();
        validator.expect_validate_dependencies().never();

        let err = PremisesChecker::new(Arc::new(validator), Arc::new(health))
            .check(
                &dogu_resource("official/ldap", "2.4.49-1"),
                &descriptor("official/ldap", "2.4.48-4"),
                &descriptor("official/ldap", "2.4.49-1"),
            )
            .await
            .unwrap_err();
        assert!(err.requeue());
        assert!(err.to_string().contains("not healthy"));
    }

    #[tokio::test]
    async fn invalid_dependencies_are_terminal() {
        let mut health = MockDoguHealthCheck::new();
        health.expect_check().returning(|_| Ok(()));
        health.expect_check_dependencies_recursive().never();
        let mut validator = MockDependencyValidator::new();
        validator.expect_validate_dependencies().returning(|_| {
            Err(Error::Collaborator {
                operation: "validate dependency postfix".to_string(),
                source: "version 3.6.4-1 does not satisfy >=3.6.5".into(),
            })
        });

        let err = PremisesChecker::new(Arc::new(validator), Arc::new(health))
            .check(
                &dogu_resource("official/ldap", "2.4.49-1"),
                &descriptor("official/ldap", "2.4.48-4"),
                &descriptor("official/ldap", "2.4.49-1"),
            )
            .await
            .unwrap_err();
        assert!(!err.requeue());
        assert!(matches!(err, Error::DependencyValidation { .. }));
    }

    #[tokio::test]
    async fn unhealthy_dependencies_are_requeued() {
        let mut health = MockDoguHealthCheck::new();
        health.expect_check().returning(|_| Ok(()));
        health
            .expect_check_dependencies_recursive()
            .returning(|descriptor, namespace| {
                assert_eq!(descriptor.version, "2.4.48-4");
                assert_eq!(namespace, "ecosystem");
                Err(Error::DependenciesUnhealthy {
                    dogu: descriptor.name.clone(),
                    failures: vec![unhealthy("postfix")],
                })
            });
        let mut validator = MockDependencyValidator::new();
        validator
            .expect_validate_dependencies()
            .returning(|_| Ok(()));

        let err = PremisesChecker::new(Arc::new(validator), Arc::new(health))
            .check(
                &dogu_resource("official/ldap", "2.4.49-1"),
                &descriptor("official/ldap", "2.4.48-4"),
                &descriptor("official/ldap", "2.4.49-1"),
            )
            .await
            .unwrap_err();
        assert!(err.requeue());
        assert!(err.to_string().contains("postfix"));
    }
}
