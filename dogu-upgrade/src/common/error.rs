use crate::exec::PodStatusGate;
use snafu::Snafu;
use std::time::Duration;

/// Boxed error type for failures reported by collaborators outside of this crate.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// For use with multiple fallible operations which may fail for different reasons, but are
/// defined withing the same scope and must return to the outer scope (calling scope) using
/// the try operator -- '?'.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))]
pub enum Error {
    /// Error for when cli args are parsed.
    #[snafu(display("Failed to parse cli args: {}", source))]
    CliArgsParse { source: clap::error::Error },

    /// Error for when Kubernetes API client generation fails.
    #[snafu(display("Failed to generate kubernetes client: {}", source))]
    K8sClientGeneration { source: kube::Error },

    /// Error for use when parsing invalid tracing-subscriber filter directive.
    #[snafu(display(
        "Failed to create tracing-subscriber filter with directive {}: {}",
        filter,
        source
    ))]
    TracingSubscriberFilter {
        source: tracing_subscriber::filter::ParseError,
        filter: String,
    },

    /// Error for when regular expression parsing or compilation fails.
    #[snafu(display("Failed to compile regex {}: {}", expression, source))]
    RegexCompile {
        source: regex::Error,
        expression: String,
    },

    #[snafu(display("Failed to GET Namespace {}: {}", namespace, source))]
    GetNamespace {
        source: kube::Error,
        namespace: String,
    },

    #[snafu(display("Failed to GET Dogu {} in namespace {}: {}", name, namespace, source))]
    GetDogu {
        source: kube::Error,
        name: String,
        namespace: String,
    },

    #[snafu(display("'{}' is not a valid dogu name", name))]
    InvalidDoguName { name: String },

    #[snafu(display("Failed to serialize YAML: {}", source))]
    YamlSerialize { source: serde_yaml::Error },

    #[snafu(display("Failed to parse dogu descriptor: {}", source))]
    DescriptorParse { source: serde_json::Error },

    /// Error for when a version string does not follow the dogu version scheme.
    #[snafu(display("Failed to parse version '{}'", version))]
    VersionParse { version: String },

    #[snafu(display("Failed to parse qualified dogu name '{}'", name))]
    QualifiedNameParse { name: String },

    #[snafu(display("Unknown pod status gate '{}'", value))]
    UnknownPodStatusGate { value: String },

    /// Error reported by a collaborator (registry, image registry, service accounts, ...).
    #[snafu(display("Failed to {}: {}", operation, source))]
    Collaborator {
        operation: String,
        source: BoxedError,
    },

    #[snafu(display("Failed to get current descriptor of dogu {}: {}", name, source))]
    GetCurrentDescriptor { name: String, source: Box<Error> },

    #[snafu(display(
        "Dogu {} cannot be upgraded from version {} to {}: the target version must be newer",
        dogu,
        from,
        to
    ))]
    Downgrade {
        dogu: String,
        from: String,
        to: String,
    },

    #[snafu(display(
        "Dogu name of the installed descriptor {} does not match the remote descriptor {}",
        local,
        remote
    ))]
    DoguNameMismatch { local: String, remote: String },

    #[snafu(display(
        "Dogu namespace of the installed descriptor {} does not match the remote descriptor {}; set .spec.upgradeConfig.allowNamespaceSwitch to allow this",
        local,
        remote
    ))]
    DoguNamespaceMismatch { local: String, remote: String },

    #[snafu(display("Failed to validate dependencies of dogu {}: {}", dogu, source))]
    DependencyValidation { dogu: String, source: Box<Error> },

    #[snafu(display(
        "Dogu {} in Namespace {} is not healthy: {}/{} replicas ready",
        dogu,
        namespace,
        ready,
        desired
    ))]
    DoguNotHealthy {
        dogu: String,
        namespace: String,
        ready: i32,
        desired: i32,
    },

    #[snafu(display(
        "Dependencies of dogu {} are not healthy: {}",
        dogu,
        join_errors(failures)
    ))]
    DependenciesUnhealthy { dogu: String, failures: Vec<Error> },

    /// Marks an error after which the whole operation should be attempted again later.
    #[snafu(display("{}", source))]
    Requeue { source: Box<Error> },

    #[snafu(display(
        "Failed to GET Pod {} in namespace {}: {}",
        pod_name,
        pod_namespace,
        source
    ))]
    GetPod {
        source: kube::Error,
        pod_name: String,
        pod_namespace: String,
    },

    #[snafu(display(
        "Failed to list Pods with label {} in namespace {}: {}",
        label,
        namespace,
        source
    ))]
    ListPodsWithLabel {
        source: kube::Error,
        label: String,
        namespace: String,
    },

    #[snafu(display("Failed to create Pod {} in namespace {}: {}", pod_name, namespace, source))]
    CreatePod {
        source: kube::Error,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display("Failed to delete Pod {} in namespace {}: {}", pod_name, namespace, source))]
    DeletePod {
        source: kube::Error,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display(
        "Failed to GET Deployment {} in namespace {}: {}",
        name,
        namespace,
        source
    ))]
    GetDeployment {
        source: kube::Error,
        name: String,
        namespace: String,
    },

    #[snafu(display(
        "Failed to update Deployment {} in namespace {}: {}",
        name,
        namespace,
        source
    ))]
    UpdateDeployment {
        source: kube::Error,
        name: String,
        namespace: String,
    },

    #[snafu(display("Failed get .spec.template.spec from Deployment {} in Namespace {}", name, namespace))]
    EmptyDeploymentSpec { name: String, namespace: String },

    #[snafu(display("{} has no {}", kind, field))]
    MissingMetadata {
        kind: &'static str,
        field: &'static str,
    },

    #[snafu(display("Failed to build owner reference to dogu {}: .metadata.uid is empty", dogu))]
    OwnerReference { dogu: String },

    #[snafu(display(
        "Found no Pod for dogu {} with label {} in namespace {}",
        dogu,
        selector,
        namespace
    ))]
    NoPodForDogu {
        dogu: String,
        selector: String,
        namespace: String,
    },

    #[snafu(display("Pod {} does not fulfill status {} yet", pod_name, expected))]
    PodStatusMismatch {
        pod_name: String,
        expected: PodStatusGate,
    },

    #[snafu(display(
        "expected status {} not fulfilled for Pod {}: {}",
        expected,
        pod_name,
        source
    ))]
    PodStatusWait {
        pod_name: String,
        expected: PodStatusGate,
        source: Box<Error>,
    },

    #[snafu(display(
        "the maximum number of retries was reached after {} attempts: {}",
        attempts,
        source
    ))]
    RetriesExhausted { attempts: u32, source: Box<Error> },

    #[snafu(display(
        "the retry budget of {} was exhausted: {}",
        humantime::format_duration(*timeout),
        source
    ))]
    RetryTimeout {
        timeout: Duration,
        source: Box<Error>,
    },

    #[snafu(display("Failed to stream command '{}' to Pod {}: {}", command, pod_name, source))]
    ExecStream {
        source: kube::Error,
        pod_name: String,
        command: String,
    },

    #[snafu(display(
        "Failed to transfer data of command '{}' in Pod {}: {}",
        command,
        pod_name,
        source
    ))]
    ExecStreamIo {
        source: std::io::Error,
        pod_name: String,
        command: String,
    },

    #[snafu(display(
        "Command '{}' failed in Pod {}: {}; stderr: {}",
        command,
        pod_name,
        message,
        stderr
    ))]
    ExecCommandFailed {
        pod_name: String,
        command: String,
        message: String,
        stderr: String,
    },

    #[snafu(display("ExecPod {} is not running yet, phase: {}", pod_name, phase))]
    ExecPodNotRunning { pod_name: String, phase: String },

    #[snafu(display("ExecPod {} terminated with phase {}", pod_name, phase))]
    ExecPodTerminated { pod_name: String, phase: String },

    #[snafu(display("Failed to start ExecPod {}: {}", pod_name, source))]
    ExecPodStart { pod_name: String, source: Box<Error> },

    #[snafu(display("Dogu {} does not expose command {}", dogu, command))]
    MissingExposedCommand { dogu: String, command: String },

    /// Phase or step specific context of an upgrade failure.
    #[snafu(display("{}: {}", step, source))]
    Upgrade {
        step: &'static str,
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wraps the error into one which tells the caller to try the whole operation again later.
    pub fn requeueable(self) -> Self {
        Error::Requeue {
            source: Box::new(self),
        }
    }

    /// True if the outer control loop should try the whole operation again later instead of
    /// treating the failure as terminal.
    pub fn requeue(&self) -> bool {
        matches!(self, Error::Requeue { .. })
    }

    /// True if the Kubernetes API answered with 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kube_source(),
            Some(kube::Error::Api(response)) if response.code == 404
        )
    }

    /// Wraps the error with a phase or step specific message.
    pub(crate) fn upgrade(step: &'static str) -> impl FnOnce(Error) -> Error {
        move |source| Error::Upgrade {
            step,
            source: Box::new(source),
        }
    }

    fn kube_source(&self) -> Option<&kube::Error> {
        match self {
            Error::GetPod { source, .. }
            | Error::ListPodsWithLabel { source, .. }
            | Error::CreatePod { source, .. }
            | Error::DeletePod { source, .. }
            | Error::GetDeployment { source, .. }
            | Error::UpdateDeployment { source, .. }
            | Error::ExecStream { source, .. }
            | Error::GetNamespace { source, .. }
            | Error::GetDogu { source, .. }
            | Error::K8sClientGeneration { source } => Some(source),
            _ => None,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn must<T>(output: Result<T>) -> T {
    match output {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(%error, "Failed to run dogu-upgrade");
            std::process::exit(-1);
        }
    }
}

#[cfg(test)]
pub(crate) fn not_found() -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "not found".to_string(),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

#[cfg(test)]
pub(crate) fn internal_error(message: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    })
}
