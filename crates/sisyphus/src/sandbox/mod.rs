//! The sandbox backend capability interface (C1).
//!
//! Two implementations satisfy this trait: [`docker::LocalDaemonBackend`]
//! talks to a local Docker daemon, [`cluster::ClusterBackend`] schedules a
//! single-shot Kubernetes Job. Neither vendor type crosses this boundary.

pub mod cluster;
pub mod docker;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use olympus_common::error::{AppError, InfraErrorKind};

/// Memory ceiling per sandbox invocation.
pub const MAX_MEMORY_BYTES: i64 = 128 * 1024 * 1024;
/// CPU ceiling per sandbox invocation, in core-equivalents.
pub const MAX_CPU_CORES: f64 = 0.5;
/// Process count ceiling per sandbox invocation.
pub const MAX_PIDS: i64 = 100;
/// Captured output cap, per stream.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;
/// Default wall-clock timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a backend needs to run one compile command in isolation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub job_id: String,
    pub image: String,
    pub source_text: String,
    pub source_filename: String,
    pub compile_command: Vec<String>,
    pub workdir: String,
    pub env_vars: HashMap<String, String>,
    pub timeout: Duration,
}

/// What came back from one sandbox invocation.
#[derive(Debug, Clone, Default)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Truncates `buf` to at most `MAX_OUTPUT_BYTES`, respecting UTF-8 boundaries.
pub fn cap_output(buf: &[u8]) -> String {
    let capped = if buf.len() > MAX_OUTPUT_BYTES {
        &buf[..MAX_OUTPUT_BYTES]
    } else {
        buf
    };
    String::from_utf8_lossy(capped).into_owned()
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Runs one compile command inside an isolated environment.
    async fn compile(&self, config: SandboxConfig) -> Result<SandboxOutput, AppError>;

    /// Reports whether `image` is already available, without pulling it.
    /// The compiler calls this at startup and refuses to start if a
    /// required image is missing — building images on demand is rejected.
    async fn image_exists(&self, image: &str) -> Result<bool, AppError>;

    /// Releases any backend-held resources (client handles, watch tasks).
    async fn close(&self) -> Result<(), AppError>;
}

pub(crate) fn infra_err(kind: InfraErrorKind, err: impl Into<anyhow::Error>) -> AppError {
    AppError::infrastructure(kind, err.into())
}
