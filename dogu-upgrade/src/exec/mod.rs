/// Immutable shell command values.
pub mod command;

/// Ephemeral helper Pods which serve as exec targets.
pub mod exec_pod;

/// Retrying command execution in live Pods.
pub mod executor;

/// Reading files out of containers.
pub mod file_extractor;

/// Pod status gates and transient stream errors.
pub mod gate;

/// The remote exec sub-protocol.
pub mod transport;

pub use command::ShellCommand;
pub use exec_pod::{
    wait_for_abandoned_exec_pods, CommandTarget, ExecPod, ExecPodFactory, ExecPodGuard, ObjectKey,
    VolumeMode,
};
pub use executor::CommandExecutor;
pub use file_extractor::FileExtractor;
pub use gate::{PodStatusGate, TransientErrorPredicate};
pub use transport::{ExecTarget, KubePodExec, PodExec};
