use std::time::Duration;

/// This is the name of the event reporter. Events concerning a Dogu upgrade are published with
/// this value as their reporting controller.
pub(crate) const KUBE_EVENT_REPORTER_NAME: &str = "dogu-upgrade";

/// Default directive for the tracing-subscriber filter, used when RUST_LOG is not set.
pub const DEFAULT_TRACING_FILTER: &str = "info";

/// Label key which carries the simple name of a Dogu on its Pods.
pub const DOGU_NAME_LABEL: &str = "dogu.name";

/// Label key which carries the version of a Dogu on its Pods.
pub const DOGU_VERSION_LABEL: &str = "dogu.version";

/// Label key which carries the simple name of the dogu an ExecPod was created for. ExecPods do
/// not carry the dogu labels so that they are never mistaken for a dogu Pod.
pub const EXEC_POD_DOGU_LABEL: &str = "execpod.dogu.name";

/// Label key/value which marks a Pod as an ExecPod.
pub const EXEC_POD_COMPONENT_LABEL: (&str, &str) = ("app.kubernetes.io/component", "execpod");

/// Infix of generated ExecPod names, `<simple-name>-execpod-<suffix>`.
pub(crate) const EXEC_POD_NAME_INFIX: &str = "execpod";

/// Length of the random suffix of ExecPod names.
pub(crate) const EXEC_POD_SUFFIX_LEN: usize = 6;

/// The ExecPod only serves as an exec target, so it sleeps forever.
pub(crate) const EXEC_POD_COMMAND: [&str; 2] = ["/bin/sleep", "infinity"];

/// Name of the reserved data volume inside Dogu and ExecPods.
pub(crate) const RESERVED_VOLUME_NAME: &str = "dogu-reserved";

/// Suffix of the PersistentVolumeClaim backing the reserved data volume, `<simple-name>-reserved`.
pub(crate) const RESERVED_VOLUME_CLAIM_SUFFIX: &str = "reserved";

/// Mount path of the reserved data volume. Dogu Pods and upgrade ExecPods share it.
pub const RESERVED_VOLUME_MOUNT_PATH: &str = "/tmp/dogu-reserved";

/// Directory inside a Dogu image which holds custom Kubernetes resources.
pub const CUSTOM_RESOURCE_DIR: &str = "/k8s";

/// Exposed command which is executed against the old Pod before the Deployment changes.
pub const PRE_UPGRADE_COMMAND: &str = "pre-upgrade";

/// Exposed command which is executed against the new Pod after the Deployment changed.
pub const POST_UPGRADE_COMMAND: &str = "post-upgrade";

/// Startup probe failure threshold of a Dogu Deployment outside of upgrades.
pub const DEFAULT_STARTUP_PROBE_FAILURE_THRESHOLD: i32 = 3;

/// Startup probe failure threshold while the first start after an upgrade is running.
pub const UPGRADE_STARTUP_PROBE_FAILURE_THRESHOLD: i32 = 1080;

/// Transient stream error signature of the exec transport.
pub const DIALING_BACKEND_EOF: &str = "error dialing backend: EOF";

/// Default attempt ceiling for Pod status waits, Pod lookups and command streaming.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Default pause between two attempts.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(3);

/// Default time budget for pulling the image configuration.
pub const DEFAULT_IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between two image pull attempts.
pub const DEFAULT_IMAGE_PULL_PAUSE: Duration = Duration::from_secs(5);

/// Event reason for upgrade progress events.
pub(crate) const UPGRADE_EVENT_REASON: &str = "Upgrading";

/// Event reason for failures during an upgrade.
pub(crate) const UPGRADE_ERROR_EVENT_REASON: &str = "ErrUpgrade";

/// Event reason for commands executed from the command line.
pub const EXEC_EVENT_REASON: &str = "ExecCommand";
