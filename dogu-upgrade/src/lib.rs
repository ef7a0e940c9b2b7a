//! Upgrades of dogus running in a Kubernetes cluster, and the remote command execution they are
//! built on: ExecPods, retrying command streams into live Pods and file extraction.

/// Cluster object access.
pub mod cluster;

/// Contains the client, constants and error type shared by all modules.
pub mod common;

/// Dogu descriptors, versions and the Dogu custom resource.
pub mod dogu;

/// Command execution inside Pods.
pub mod exec;

/// Contains the Kubernetes Event helpers.
pub mod k8s;

/// Command line arguments.
pub mod opts;

/// Bounded retries.
pub mod retry;

/// Version gates, premises and the upgrade state machine.
pub mod upgrade;
