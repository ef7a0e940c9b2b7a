use crate::{
    common::constants::DEFAULT_MAX_RETRIES,
    exec::{PodStatusGate, TransientErrorPredicate},
    retry::{DeadlineRetry, RetryPolicy},
    upgrade::Tunables,
};
use clap::{Parser, Subcommand};
use std::time::Duration;

/// Validation of arguments which needs more than their syntax.
pub mod validators;

/// Runs commands inside dogu Pods and reads custom resources out of dogu images.
#[derive(Parser, Debug)]
#[command(name = "dogu-upgrade", version)]
pub struct CliArgs {
    /// This is the Kubernetes Namespace the dogus live in.
    #[arg(short, long, env = "NAMESPACE", default_value = "ecosystem")]
    namespace: String,

    /// Number of attempts for Pod status waits, Pod lookups and command streams.
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Pause between two attempts, e.g. '3s'.
    #[arg(long, env = "RETRY_PAUSE", value_parser = humantime::parse_duration, default_value = "3s")]
    retry_pause: Duration,

    /// Time budget for pulling an image configuration, e.g. '1m'.
    #[arg(long, env = "IMAGE_PULL_TIMEOUT", value_parser = humantime::parse_duration, default_value = "1m")]
    image_pull_timeout: Duration,

    /// Pause between two image pull attempts.
    #[arg(long, env = "IMAGE_PULL_PAUSE", value_parser = humantime::parse_duration, default_value = "5s")]
    image_pull_pause: Duration,

    /// Additional error messages after which a command stream is retried.
    #[arg(long = "transient-error", env = "TRANSIENT_ERRORS", value_delimiter = ',')]
    transient_errors: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Executes a command inside the Pod of a dogu.
    Exec {
        /// Name of the Dogu resource.
        dogu: String,
        /// Version label of the Pod. Defaults to the version of the Dogu resource.
        #[arg(long)]
        version: Option<String>,
        /// Pod status required before the command is streamed, 'ready' or 'started'.
        #[arg(long, default_value = "ready")]
        gate: PodStatusGate,
        /// The command and its arguments.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Prints the custom Kubernetes resources contained in a dogu image as YAML.
    Extract {
        /// Name of the Dogu resource which owns the ExecPod.
        dogu: String,
        /// Image of the dogu without tag, e.g. 'registry.cloudogu.com/official/ldap'.
        #[arg(long)]
        image: String,
        /// Version of the dogu, used as image tag.
        #[arg(long)]
        version: String,
    },
}

impl CliArgs {
    /// This is the Kubernetes Namespace the dogus live in.
    pub fn namespace(&self) -> String {
        self.namespace.clone()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The retry tunables of every component.
    pub fn tunables(&self) -> Tunables {
        let transient = self
            .transient_errors
            .iter()
            .filter(|signature| !signature.is_empty())
            .fold(TransientErrorPredicate::default(), |predicate, signature| {
                predicate.with_signature(signature.clone())
            });

        Tunables {
            retry: RetryPolicy::new(self.max_retries, self.retry_pause),
            image_pull: DeadlineRetry::new(self.image_pull_timeout, self.image_pull_pause),
            transient,
        }
    }
}
