//! The compiler (C2): validates a request, resolves its environment,
//! builds the compile command, invokes the sandbox backend, and
//! classifies the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use olympus_common::types::{CompilationJob, CompilationResult, Language};

use crate::environments::EnvironmentRegistry;
use crate::sandbox::{SandboxBackend, SandboxConfig};

/// Hard cap on the base64-encoded request body.
const MAX_ENCODED_BYTES: usize = 2 * 1024 * 1024;
/// Hard cap on the decoded source.
const MAX_DECODED_BYTES: usize = 1024 * 1024;

pub struct Compiler {
    backend: Arc<dyn SandboxBackend>,
    registry: Arc<EnvironmentRegistry>,
    timeout: Duration,
}

impl Compiler {
    pub fn new(backend: Arc<dyn SandboxBackend>, registry: Arc<EnvironmentRegistry>, timeout: Duration) -> Self {
        Self {
            backend,
            registry,
            timeout,
        }
    }

    /// Runs the full validate → decode → resolve → build → invoke →
    /// classify pipeline for one job. Never returns `Err`: every failure
    /// mode is represented in the returned [`CompilationResult`].
    pub async fn compile(&self, job: &CompilationJob) -> CompilationResult {
        let job_id = job.id;
        let req = &job.request;

        if req.code.len() > MAX_ENCODED_BYTES {
            return failed(job_id, "source too large: encoded body exceeds 2 MB");
        }

        let decoded = match base64::engine::general_purpose::STANDARD.decode(&req.code) {
            Ok(bytes) => bytes,
            Err(_) => return failed(job_id, "invalid base64 encoding"),
        };

        if decoded.len() > MAX_DECODED_BYTES {
            return failed(job_id, "source too large: decoded source exceeds 1 MB");
        }

        let source_text = match String::from_utf8(decoded) {
            Ok(text) => text,
            Err(_) => return failed(job_id, "invalid base64 encoding"),
        };

        let env_spec = match self
            .registry
            .resolve(req.language, req.compiler.as_deref())
        {
            Some(spec) => spec,
            None => {
                return failed(
                    job_id,
                    &format!(
                        "unsupported environment: {}",
                        req.compiler
                            .as_deref()
                            .map(|c| format!("{}-{c}", req.language))
                            .unwrap_or_else(|| req.language.to_string())
                    ),
                );
            }
        };

        let standard = req
            .standard
            .clone()
            .or_else(|| env_spec.default_standard.clone());

        let source_filename = req.language.source_filename().to_string();
        let workdir = "/workspace".to_string();
        let compile_command = build_compile_command(req.language, &workdir, &source_filename, standard.as_deref());

        let mut env_vars = HashMap::new();
        if let Some(standard) = &standard {
            env_vars.insert("STANDARD".to_string(), standard.clone());
        }
        env_vars.insert("SOURCE_FILE".to_string(), source_filename.clone());
        env_vars.insert(
            "COMPILE_TIMEOUT".to_string(),
            self.timeout.as_secs().to_string(),
        );

        let sandbox_cfg = SandboxConfig {
            job_id: job_id.to_string(),
            image: env_spec.image.clone(),
            source_text,
            source_filename,
            compile_command,
            workdir,
            env_vars,
            timeout: self.timeout,
        };

        match self.backend.compile(sandbox_cfg).await {
            Ok(output) => {
                let compiled = output.exit_code == 0 && !output.timed_out;
                CompilationResult {
                    job_id,
                    success: true,
                    compiled,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.exit_code,
                    duration: output.duration.as_nanos() as i64,
                    error: output.timed_out.then(|| "compilation timeout".to_string()),
                }
            }
            Err(err) => failed(job_id, &format!("compilation failed: {err}")),
        }
    }

    /// Fails startup if any required image is not already present locally;
    /// building images on demand is explicitly rejected.
    pub async fn verify_images_present(&self) -> Result<(), String> {
        for image in self.registry.all_images() {
            match self.backend.image_exists(image).await {
                Ok(true) => {}
                Ok(false) => return Err(format!("required image missing: {image}")),
                Err(e) => return Err(format!("could not check image {image}: {e}")),
            }
        }
        Ok(())
    }
}

fn build_compile_command(
    language: Language,
    workdir: &str,
    source_filename: &str,
    standard: Option<&str>,
) -> Vec<String> {
    let source_path = format!("{workdir}/{source_filename}");
    let output_path = format!("{workdir}/output");
    match language {
        Language::C | Language::Cpp => {
            let std_flag = standard.unwrap_or("c17");
            vec![
                "g++".to_string(),
                format!("-std={std_flag}"),
                source_path,
                "-o".to_string(),
                output_path,
            ]
        }
        Language::Go => vec![
            "go".to_string(),
            "build".to_string(),
            "-o".to_string(),
            output_path,
            source_path,
        ],
        Language::Rust => vec!["rustc".to_string(), source_path, "-o".to_string(), output_path],
    }
}

fn failed(job_id: olympus_common::types::JobId, error: &str) -> CompilationResult {
    CompilationResult {
        job_id,
        success: false,
        compiled: false,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: -1,
        duration: 0,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use olympus_common::error::AppError;
    use olympus_common::types::{Architecture, CompilationRequest, Os};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        exit_code: i32,
        timed_out: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SandboxBackend for MockBackend {
        async fn compile(
            &self,
            _cfg: SandboxConfig,
        ) -> Result<crate::sandbox::SandboxOutput, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::sandbox::SandboxOutput {
                stdout: "ok".to_string(),
                stderr: String::new(),
                exit_code: self.exit_code,
                duration: Duration::from_millis(10),
                timed_out: self.timed_out,
            })
        }

        async fn image_exists(&self, _image: &str) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn close(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn job_with(code: &str, language: Language) -> CompilationJob {
        CompilationJob::new(
            uuid::Uuid::new_v4(),
            CompilationRequest {
                code: code.to_string(),
                language,
                compiler: None,
                standard: None,
                architecture: Architecture::X86_64,
                os: Os::Linux,
            },
        )
    }

    #[tokio::test]
    async fn invalid_base64_is_rejected() {
        let backend = Arc::new(MockBackend {
            exit_code: 0,
            timed_out: false,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let job = job_with("not base64!!!", Language::Cpp);
        let result = compiler.compile(&job).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("invalid base64 encoding"));
    }

    #[tokio::test]
    async fn oversize_source_is_rejected() {
        let backend = Arc::new(MockBackend {
            exit_code: 0,
            timed_out: false,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let huge = base64::engine::general_purpose::STANDARD.encode(vec![b'a'; 2 * 1024 * 1024]);
        let job = job_with(&huge, Language::Cpp);
        let result = compiler.compile(&job).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("too large"));
    }

    #[tokio::test]
    async fn unsupported_environment_is_rejected() {
        let backend = Arc::new(MockBackend {
            exit_code: 0,
            timed_out: false,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let mut job = job_with(
            &base64::engine::general_purpose::STANDARD.encode("int main(){}"),
            Language::Cpp,
        );
        job.request.compiler = Some("gcc-1".to_string());
        let result = compiler.compile(&job).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("unsupported environment"));
    }

    #[tokio::test]
    async fn successful_compile_is_classified_compiled() {
        let backend = Arc::new(MockBackend {
            exit_code: 0,
            timed_out: false,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let job = job_with(
            &base64::engine::general_purpose::STANDARD.encode("int main(){return 0;}"),
            Language::Cpp,
        );
        let result = compiler.compile(&job).await;
        assert!(result.success);
        assert!(result.compiled);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let backend = Arc::new(MockBackend {
            exit_code: 1,
            timed_out: false,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let job = job_with(
            &base64::engine::general_purpose::STANDARD.encode("this does not compile"),
            Language::Cpp,
        );
        let result = compiler.compile(&job).await;
        assert!(result.success);
        assert!(!result.compiled);
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn timeout_is_classified() {
        let backend = Arc::new(MockBackend {
            exit_code: 124,
            timed_out: true,
            calls: AtomicUsize::new(0),
        });
        let compiler = Compiler::new(backend, Arc::new(EnvironmentRegistry::hardcoded()), Duration::from_secs(30));
        let job = job_with(
            &base64::engine::general_purpose::STANDARD.encode("while(1){}"),
            Language::Cpp,
        );
        let result = compiler.compile(&job).await;
        assert!(result.success);
        assert!(!result.compiled);
        assert_eq!(result.error.as_deref(), Some("compilation timeout"));
    }
}
