//! Cluster-scheduled sandbox backend: one `ConfigMap` + one single-shot
//! `batch/v1 Job` per invocation, selected when the process is itself
//! running inside a Kubernetes cluster.

use std::collections::BTreeMap;
use std::time::Instant;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, PodSecurityContext, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::Client;
use olympus_common::error::{AppError, InfraErrorKind};

use super::{cap_output, infra_err, SandboxBackend, SandboxConfig, SandboxOutput};

pub struct ClusterBackend {
    client: Client,
    namespace: String,
}

impl ClusterBackend {
    pub async fn connect(namespace: String) -> Result<Self, AppError> {
        let client = Client::try_default()
            .await
            .map_err(|e| infra_err(InfraErrorKind::ClusterApiError, e))?;
        Ok(Self { client, namespace })
    }

    fn job_name(job_id: &str) -> String {
        format!("sisyphus-compile-{job_id}")
    }

    fn configmap_name(job_id: &str) -> String {
        format!("sisyphus-source-{job_id}")
    }
}

#[async_trait::async_trait]
impl SandboxBackend for ClusterBackend {
    async fn compile(&self, cfg: SandboxConfig) -> Result<SandboxOutput, AppError> {
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);

        let cm_name = Self::configmap_name(&cfg.job_id);
        let job_name = Self::job_name(&cfg.job_id);

        let mut data = BTreeMap::new();
        data.insert(cfg.source_filename.clone(), cfg.source_text.clone());

        let configmap = ConfigMap {
            metadata: ObjectMeta {
                name: Some(cm_name.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        configmaps
            .create(&PostParams::default(), &configmap)
            .await
            .map_err(|e| infra_err(InfraErrorKind::ClusterApiError, e))?;

        let result = self.run_job(&jobs, &job_name, &cm_name, &cfg).await;

        let dp = DeleteParams::background();
        let _ = jobs.delete(&job_name, &dp).await;
        let _ = configmaps.delete(&cm_name, &dp).await;

        result
    }

    async fn image_exists(&self, _image: &str) -> Result<bool, AppError> {
        // The cluster backend trusts the cluster's own image pull policy
        // and pre-pulled node images; liveness is established by the
        // startup probe attempting a dry-run Job creation instead.
        Ok(true)
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

impl ClusterBackend {
    async fn run_job(
        &self,
        jobs: &Api<Job>,
        job_name: &str,
        cm_name: &str,
        cfg: &SandboxConfig,
    ) -> Result<SandboxOutput, AppError> {
        let mut limits = BTreeMap::new();
        limits.insert(
            "memory".to_string(),
            Quantity(format!("{}", super::MAX_MEMORY_BYTES)),
        );
        limits.insert(
            "cpu".to_string(),
            Quantity(format!("{}m", (super::MAX_CPU_CORES * 1000.0) as i64)),
        );

        let env: Vec<EnvVar> = cfg
            .env_vars
            .iter()
            .map(|(k, v)| EnvVar {
                name: k.clone(),
                value: Some(v.clone()),
                ..Default::default()
            })
            .collect();

        let container = Container {
            name: "compile".to_string(),
            image: Some(cfg.image.clone()),
            command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            args: Some(vec![cfg.compile_command.join(" ")]),
            working_dir: Some(cfg.workdir.clone()),
            env: Some(env),
            resources: Some(ResourceRequirements {
                limits: Some(limits.clone()),
                requests: Some(limits),
                claims: None,
            }),
            security_context: Some(SecurityContext {
                run_as_non_root: Some(true),
                allow_privilege_escalation: Some(false),
                capabilities: Some(k8s_openapi::api::core::v1::Capabilities {
                    drop: Some(vec!["ALL".to_string()]),
                    add: None,
                }),
                ..Default::default()
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: "source".to_string(),
                mount_path: cfg.workdir.clone(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            security_context: Some(PodSecurityContext {
                run_as_non_root: Some(true),
                ..Default::default()
            }),
            volumes: Some(vec![Volume {
                name: "source".to_string(),
                config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                    name: cm_name.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let job = Job {
            metadata: ObjectMeta {
                name: Some(job_name.to_string()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(pod_spec),
                },
                backoff_limit: Some(0),
                active_deadline_seconds: Some(cfg.timeout.as_secs() as i64),
                ttl_seconds_after_finished: Some(300),
                ..Default::default()
            }),
            status: None,
        };

        let start = Instant::now();

        jobs.create(&PostParams::default(), &job)
            .await
            .map_err(|e| infra_err(InfraErrorKind::ClusterApiError, e))?;

        let wait = await_condition(jobs.clone(), job_name, conditions::is_job_completed());
        let timed_out = tokio::time::timeout(cfg.timeout + std::time::Duration::from_secs(5), wait)
            .await
            .is_err();

        let pods: Api<k8s_openapi::api::core::v1::Pod> =
            Api::namespaced(self.client.clone(), &self.namespace);
        let lp = LogParams {
            container: Some("compile".to_string()),
            ..Default::default()
        };
        let pod_name_selector = format!("job-name={job_name}");
        let list_params = kube::api::ListParams::default().labels(&pod_name_selector);
        let pod_list = pods
            .list(&list_params)
            .await
            .map_err(|e| infra_err(InfraErrorKind::ClusterApiError, e))?;

        let mut stdout = String::new();
        let mut exit_code = if timed_out { 124 } else { -1 };

        if let Some(pod) = pod_list.items.first() {
            if let Some(name) = &pod.metadata.name {
                if let Ok(logs) = pods.logs(name, &lp).await {
                    stdout = cap_output(logs.as_bytes());
                }
                if let Some(status) = &pod.status {
                    if let Some(statuses) = &status.container_statuses {
                        if let Some(cs) = statuses.first() {
                            if let Some(terminated) = cs.state.as_ref().and_then(|s| s.terminated.as_ref())
                            {
                                exit_code = terminated.exit_code;
                            }
                        }
                    }
                }
            }
        }

        Ok(SandboxOutput {
            stdout,
            stderr: String::new(),
            exit_code,
            duration: start.elapsed(),
            timed_out,
        })
    }
}
