use crate::{
    common::error::{
        Error::{ExecCommandFailed, ExecStream, ExecStreamIo, MissingMetadata},
        Result,
    },
    exec::command::ShellCommand,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, AttachParams},
    Client,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// The Pod and container a command is streamed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod_name: String,
    pub container: Option<String>,
}

impl ExecTarget {
    /// Addresses the first container of the Pod. Fails if the Pod cannot be addressed at all.
    pub fn for_pod(pod: &Pod) -> Result<Self> {
        let pod_name = pod.metadata.name.clone().ok_or(MissingMetadata {
            kind: "Pod",
            field: ".metadata.name",
        })?;
        let namespace = pod.metadata.namespace.clone().ok_or(MissingMetadata {
            kind: "Pod",
            field: ".metadata.namespace",
        })?;
        let container = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.containers.first())
            .map(|container| container.name.clone());

        Ok(Self {
            namespace,
            pod_name,
            container,
        })
    }
}

/// The remote exec sub-protocol.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodExec: Send + Sync {
    /// Streams the command to the target and returns its stdout once it finished.
    async fn exec(&self, target: &ExecTarget, command: &ShellCommand) -> Result<String>;
}

/// [`PodExec`] on top of the `exec` sub-resource of the Kubernetes API.
#[derive(Clone)]
pub struct KubePodExec {
    client: Client,
}

impl KubePodExec {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodExec for KubePodExec {
    async fn exec(&self, target: &ExecTarget, command: &ShellCommand) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let mut params = AttachParams::default()
            .stdin(command.stdin().is_some())
            .stdout(true)
            .stderr(true)
            .tty(false);
        if let Some(container) = &target.container {
            params = params.container(container.clone());
        }

        let io_error = |source: std::io::Error| ExecStreamIo {
            source,
            pod_name: target.pod_name.clone(),
            command: command.to_string(),
        };

        debug!(pod.name = %target.pod_name, %command, "Streaming command");
        let mut attached = pods
            .exec(&target.pod_name, command.argv(), &params)
            .await
            .map_err(|e| ExecStream {
                source: e,
                pod_name: target.pod_name.clone(),
                command: command.to_string(),
            })?;

        let status = attached.take_status();
        let (stdout, stderr) = pipe(
            command.stdin(),
            attached.stdin(),
            attached.stdout(),
            attached.stderr(),
        )
        .await
        .map_err(io_error)?;
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        if let Err(error) = attached.join().await {
            debug!(pod.name = %target.pod_name, %error, "Exec session did not shut down cleanly");
        }

        match status {
            Some(status) if status.status.as_deref() != Some("Success") => Err(ExecCommandFailed {
                pod_name: target.pod_name.clone(),
                command: command.to_string(),
                message: status.message.unwrap_or_default(),
                stderr,
            }),
            _ => Ok(stdout),
        }
    }
}

/// Feeds `input` to stdin while both output streams are drained, so a command which echoes
/// its input cannot stall on a full output buffer.
async fn pipe<W, O, E>(
    input: Option<&[u8]>,
    stdin: Option<W>,
    stdout: Option<O>,
    stderr: Option<E>,
) -> std::io::Result<(String, String)>
where
    W: AsyncWrite + Unpin,
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let ((), stdout, stderr) = futures::try_join!(
        write_all_and_close(stdin, input),
        read_to_string(stdout),
        read_to_string(stderr)
    )?;
    Ok((stdout, stderr))
}

async fn write_all_and_close<W>(writer: Option<W>, input: Option<&[u8]>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if let (Some(mut writer), Some(input)) = (writer, input) {
        writer.write_all(input).await?;
        writer.shutdown().await?;
    }
    Ok(())
}

async fn read_to_string<R>(reader: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::{
        api::core::v1::{Container, PodSpec},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    #[test]
    fn target_addresses_first_container() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("ldap-7d9f".to_string()),
                namespace: Some("ecosystem".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "ldap".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: None,
        };

        let target = ExecTarget::for_pod(&pod).unwrap();
        assert_eq!(target.pod_name, "ldap-7d9f");
        assert_eq!(target.namespace, "ecosystem");
        assert_eq!(target.container.as_deref(), Some("ldap"));
    }

    #[test]
    fn pod_without_name_cannot_be_addressed() {
        let err = ExecTarget::for_pod(&Pod::default()).unwrap_err();
        assert!(err.to_string().contains(".metadata.name"));
    }

    #[tokio::test]
    async fn echoed_input_larger_than_the_buffers_is_piped_through() {
        let (stdin, mut remote_stdin) = duplex(64);
        let (mut remote_stdout, stdout) = duplex(64);
        // Behaves like `cat` on the remote end.
        let cat = tokio::spawn(async move {
            tokio::io::copy(&mut remote_stdin, &mut remote_stdout).await?;
            remote_stdout.shutdown().await
        });
        let input = "dn: ou=People,o=ces.local\n".repeat(1024);

        let (echoed, errors) = tokio::time::timeout(
            Duration::from_secs(5),
            pipe(Some(input.as_bytes()), Some(stdin), Some(stdout), None::<DuplexStream>),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(echoed, input);
        assert!(errors.is_empty());
        cat.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn output_is_read_without_input() {
        let (mut remote_stdout, stdout) = duplex(64);
        let (mut remote_stderr, stderr) = duplex(64);
        tokio::spawn(async move {
            remote_stdout.write_all(b"pre-upgrade.sh\n").await?;
            remote_stderr.write_all(b"warning\n").await?;
            remote_stdout.shutdown().await?;
            remote_stderr.shutdown().await
        });

        let (out, err) = pipe(None, None::<DuplexStream>, Some(stdout), Some(stderr))
            .await
            .unwrap();
        assert_eq!(out, "pre-upgrade.sh\n");
        assert_eq!(err, "warning\n");
    }
}
