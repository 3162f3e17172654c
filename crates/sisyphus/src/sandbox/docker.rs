//! Local-daemon sandbox backend: one ephemeral container per invocation,
//! talking to the Docker Engine API via `bollard`.

use std::collections::HashMap;
use std::time::Instant;

use base64::Engine;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{CreateContainerOptionsBuilder, RemoveContainerOptionsBuilder};
use bollard::Docker;
use futures::StreamExt;
use olympus_common::error::{AppError, InfraErrorKind};

use super::{cap_output, infra_err, SandboxBackend, SandboxConfig, SandboxOutput};

pub struct LocalDaemonBackend {
    docker: Docker,
}

impl LocalDaemonBackend {
    pub fn connect() -> Result<Self, AppError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;
        Ok(Self { docker })
    }

    async fn exec(&self, container_id: &str, cmd: &[&str]) -> Result<(String, String, i32), AppError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(msg) = output.next().await {
                match msg.map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))? {
                    bollard::container::LogOutput::StdOut { message } => {
                        if stdout_buf.len() < super::MAX_OUTPUT_BYTES {
                            stdout_buf.extend_from_slice(&message);
                        }
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        if stderr_buf.len() < super::MAX_OUTPUT_BYTES {
                            stderr_buf.extend_from_slice(&message);
                        }
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;
        let exit_code = inspect.exit_code.unwrap_or(-1) as i32;

        Ok((cap_output(&stdout_buf), cap_output(&stderr_buf), exit_code))
    }

    async fn write_source(&self, container_id: &str, path: &str, text: &str) -> Result<(), AppError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        let cmd = format!("printf '%s' '{encoded}' | base64 -d > {path}");
        let (_, stderr, exit_code) = self.exec(container_id, &["/bin/sh", "-c", &cmd]).await?;
        if exit_code != 0 {
            return Err(infra_err(
                InfraErrorKind::Other,
                anyhow::anyhow!("failed to write source into sandbox: {stderr}"),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SandboxBackend for LocalDaemonBackend {
    async fn compile(&self, cfg: SandboxConfig) -> Result<SandboxOutput, AppError> {
        let name = format!("sisyphus-{}", cfg.job_id);

        let host_config = HostConfig {
            memory: Some(super::MAX_MEMORY_BYTES),
            memory_swap: Some(super::MAX_MEMORY_BYTES),
            cpu_period: Some(100_000),
            cpu_quota: Some((100_000.0 * super::MAX_CPU_CORES) as i64),
            pids_limit: Some(super::MAX_PIDS),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            readonly_rootfs: Some(true),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            tmpfs: Some(HashMap::from([(
                cfg.workdir.clone(),
                "rw,noexec,nosuid,size=256m".to_string(),
            )])),
            ..Default::default()
        };

        let env: Vec<String> = cfg
            .env_vars
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let body = ContainerCreateBody {
            image: Some(cfg.image.clone()),
            tty: Some(false),
            host_config: Some(host_config),
            working_dir: Some(cfg.workdir.clone()),
            env: Some(env),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            user: Some("nobody".to_string()),
            ..Default::default()
        };

        let options = CreateContainerOptionsBuilder::default().name(&name).build();
        let container = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;

        let result = self.run_inside(&container.id, &cfg).await;

        let remove_opts = RemoveContainerOptionsBuilder::default().force(true).build();
        let _ = self.docker.remove_container(&container.id, Some(remove_opts)).await;

        result
    }

    async fn image_exists(&self, image: &str) -> Result<bool, AppError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(false)
            }
            Err(e) => Err(infra_err(InfraErrorKind::DockerUnavailable, e)),
        }
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

impl LocalDaemonBackend {
    async fn run_inside(
        &self,
        container_id: &str,
        cfg: &SandboxConfig,
    ) -> Result<SandboxOutput, AppError> {
        self.docker
            .start_container(
                container_id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(|e| infra_err(InfraErrorKind::DockerUnavailable, e))?;

        let source_path = format!("{}/{}", cfg.workdir, cfg.source_filename);
        self.write_source(container_id, &source_path, &cfg.source_text)
            .await?;

        let cmd_str = cfg.compile_command.join(" ");
        let start = Instant::now();

        let exec_future = self.exec(container_id, &["/bin/sh", "-c", &cmd_str]);
        match tokio::time::timeout(cfg.timeout, exec_future).await {
            Ok(Ok((stdout, stderr, exit_code))) => Ok(SandboxOutput {
                stdout,
                stderr,
                exit_code,
                duration: start.elapsed(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(SandboxOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 124,
                duration: start.elapsed(),
                timed_out: true,
            }),
        }
    }
}
