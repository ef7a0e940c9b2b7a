use crate::common::{
    constants::DIALING_BACKEND_EOF,
    error::{Error::UnknownPodStatusGate, Result},
    Error,
};
use k8s_openapi::api::core::v1::Pod;
use std::{fmt, str::FromStr};

/// The condition a Pod has to meet before a command is streamed to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodStatusGate {
    /// The Pod phase is `Running`.
    ContainersStarted,
    /// The Pod has a `ContainersReady` condition with status `True`.
    PodReady,
}

impl PodStatusGate {
    pub fn is_fulfilled_by(&self, pod: &Pod) -> bool {
        let status = match pod.status.as_ref() {
            Some(status) => status,
            None => return false,
        };
        match self {
            PodStatusGate::ContainersStarted => status.phase.as_deref() == Some("Running"),
            PodStatusGate::PodReady => status
                .conditions
                .as_ref()
                .map(|conditions| {
                    conditions
                        .iter()
                        .any(|c| c.type_ == "ContainersReady" && c.status == "True")
                })
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for PodStatusGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodStatusGate::ContainersStarted => write!(f, "ContainersStarted"),
            PodStatusGate::PodReady => write!(f, "PodReady"),
        }
    }
}

impl FromStr for PodStatusGate {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "started" | "containersstarted" | "containers-started" => {
                Ok(PodStatusGate::ContainersStarted)
            }
            "ready" | "podready" | "pod-ready" => Ok(PodStatusGate::PodReady),
            _ => Err(UnknownPodStatusGate {
                value: value.to_string(),
            }),
        }
    }
}

/// Decides whether a failed command stream is worth another attempt.
///
/// The exec transport reports dropped connections as plain text, and the wording depends on
/// the API server and the network between it and the kubelet, so the signatures are
/// configurable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientErrorPredicate {
    signatures: Vec<String>,
}

impl Default for TransientErrorPredicate {
    fn default() -> Self {
        Self::new([DIALING_BACKEND_EOF])
    }
}

impl TransientErrorPredicate {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: signatures.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signatures.push(signature.into());
        self
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn is_transient(&self, error: &Error) -> bool {
        let message = error.to_string();
        self.signatures
            .iter()
            .any(|signature| message.contains(signature.as_str()))
    }
}

#[cfg(test)]
pub(crate) fn pod_with_status(name: &str, phase: &str, containers_ready: bool) -> Pod {
    use k8s_openapi::{
        api::core::v1::{PodCondition, PodStatus},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ecosystem".to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            conditions: Some(vec![PodCondition {
                type_: "ContainersReady".to_string(),
                status: if containers_ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}
