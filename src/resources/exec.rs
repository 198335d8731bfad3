//! Remote command execution via the Kubernetes exec API
//!
//! Used to run administrative commands inside live pods, e.g. the ProxySQL
//! user-table resync. Captures both output streams so callers can treat
//! diagnostic output on stderr as failure even when the exit status is clean.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors that can occur during remote command execution
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to execute command in pod: {0}")]
    ExecFailed(String),

    #[error("Command failed with status {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for exec operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Captured output of a remote command
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Execute a command inside a live container and capture its output
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> ExecResult<ExecOutput>;
}

/// Production [`RemoteExecutor`] using the Kubernetes pod exec API
pub struct PodExecutor {
    client: Client,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteExecutor for PodExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> ExecResult<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        debug!(pod = %pod, namespace = %namespace, container = %container, "Executing remote command");

        let attach_params = AttachParams {
            container: Some(container.to_string()),
            stdin: true,
            stdout: true,
            stderr: true,
            tty: false,
            ..Default::default()
        };

        let mut attached = pods.exec(pod, command.to_vec(), &attach_params).await?;

        // Close stdin to signal end of input
        if let Some(mut stdin) = attached.stdin() {
            stdin.shutdown().await?;
        }

        let stdout = attached
            .stdout()
            .ok_or_else(|| ExecError::ExecFailed("Failed to get stdout from exec".to_string()))?;
        let stderr = attached
            .stderr()
            .ok_or_else(|| ExecError::ExecFailed("Failed to get stderr from exec".to_string()))?;

        let stdout_output = read_stream(stdout).await?;
        let stderr_output = read_stream(stderr).await?;

        // Wait for the process to complete
        let status = attached
            .take_status()
            .ok_or_else(|| ExecError::ExecFailed("Failed to get status from exec".to_string()))?;

        if let Some(status) = status.await
            && status.status != Some("Success".to_string())
        {
            return Err(ExecError::CommandFailed {
                status: status.status.unwrap_or_else(|| "Unknown".to_string()),
                stderr: stderr_output,
            });
        }

        Ok(ExecOutput {
            stdout: stdout_output,
            stderr: stderr_output,
        })
    }
}

/// Read an exec output stream to completion
async fn read_stream<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> ExecResult<String> {
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}
