use clap::Parser;
use dogu_upgrade::{
    cluster::{ClusterApi, KubeClusterApi},
    common::{
        clients::get_or_init_kube_client,
        constants::{DEFAULT_TRACING_FILTER, EXEC_EVENT_REASON},
        error::{
            must,
            Error::{CliArgsParse, GetDogu, TracingSubscriberFilter, YamlSerialize},
            Result,
        },
    },
    dogu::{Dogu, DoguDescriptor},
    exec::{
        wait_for_abandoned_exec_pods, CommandExecutor, ExecPod, ExecPodFactory, ExecPodGuard,
        FileExtractor, KubePodExec, PodStatusGate, ShellCommand, VolumeMode,
    },
    k8s::event_helper::{EventKind, EventSink, KubeEventSink},
    opts::{
        validators::{validate_dogu_name, validate_namespace},
        CliArgs, Command,
    },
};
use kube::{Api, Client};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    must(init_logging());

    // Global resources -- the kube client is initialized in this step.
    let opts = must(parse_cli_args().await);

    // Dropping the command future cancels every wait and stream it has in flight.
    let mut command = Box::pin(run(&opts));
    let interrupted = tokio::select! {
        result = &mut command => {
            must(result);
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        warn!("Interrupted, cancelling command");
        drop(command);
        wait_for_abandoned_exec_pods().await;
        std::process::exit(130);
    }
}

/// Initialize logging components -- tracing.
fn init_logging() -> Result<()> {
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_TRACING_FILTER))
        .map_err(|e| TracingSubscriberFilter {
            source: e,
            filter: DEFAULT_TRACING_FILTER.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// This function handles the following tasks -- 1. Argument parsing, 2. Validating arguments
/// against the cluster.
async fn parse_cli_args() -> Result<CliArgs> {
    let opts = CliArgs::try_parse().map_err(|e| CliArgsParse { source: e })?;

    let client = get_or_init_kube_client().await?;
    validate_namespace(client, opts.namespace().as_str()).await?;
    match opts.command() {
        Command::Exec { dogu, .. } | Command::Extract { dogu, .. } => validate_dogu_name(dogu)?,
    }

    Ok(opts)
}

async fn run(opts: &CliArgs) -> Result<()> {
    let client = get_or_init_kube_client().await?;
    let namespace = opts.namespace();
    let tunables = opts.tunables();
    let cluster: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::new(client.clone()));
    let executor = CommandExecutor::new(
        cluster.clone(),
        Arc::new(KubePodExec::new(client.clone())),
        tunables.retry,
        tunables.transient.clone(),
    );

    match opts.command() {
        Command::Exec {
            dogu,
            version,
            gate,
            command,
        } => {
            let resource = get_dogu(client.clone(), &namespace, dogu).await?;
            let version = version.clone().unwrap_or_else(|| resource.spec.version.clone());
            let command = ShellCommand::new(
                command.first().cloned().unwrap_or_default(),
                command.iter().skip(1).cloned(),
            );

            let output = exec(&executor, &resource, &version, &command, *gate).await?;
            KubeEventSink::new(client)
                .publish(
                    &resource,
                    EventKind::Normal,
                    EXEC_EVENT_REASON,
                    format!("Executed '{}' in Pod of version {}", command, version),
                )
                .await;
            print!("{output}");
        }
        Command::Extract {
            dogu,
            image,
            version,
        } => {
            let resource = get_dogu(client, &namespace, dogu).await?;
            let descriptor = DoguDescriptor {
                name: resource.spec.name.clone(),
                version: version.clone(),
                image: image.clone(),
                ..Default::default()
            };
            let exec_pod = ExecPodGuard::new(
                ExecPodFactory::new(cluster, executor, tunables.retry).exec_pod(
                    &resource,
                    &descriptor,
                    VolumeMode::Install,
                ),
            );

            let files = extract(&exec_pod).await;
            let pod_name = exec_pod.pod_name().to_string();
            if let Err(error) = exec_pod.release().await {
                warn!(pod.name = %pod_name, %error, "Failed to delete ExecPod");
            }

            let yaml = serde_yaml::to_string(&files?).map_err(|e| YamlSerialize { source: e })?;
            print!("{yaml}");
        }
    }

    Ok(())
}

async fn get_dogu(client: Client, namespace: &str, name: &str) -> Result<Dogu> {
    let dogus: Api<Dogu> = Api::namespaced(client, namespace);
    dogus.get(name).await.map_err(|e| GetDogu {
        source: e,
        name: name.to_string(),
        namespace: namespace.to_string(),
    })
}

async fn exec(
    executor: &CommandExecutor,
    resource: &Dogu,
    version: &str,
    command: &ShellCommand,
    gate: PodStatusGate,
) -> Result<String> {
    info!(dogu.name = %resource.spec.name, %version, %gate, "Executing command in dogu");
    executor.exec_in_dogu(resource, version, command, gate).await
}

async fn extract(exec_pod: &ExecPod) -> Result<BTreeMap<String, String>> {
    exec_pod.create().await?;
    FileExtractor::default().extract(exec_pod).await
}
