//! Shared domain types for the compile service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Job ID type.
pub type JobId = Uuid;

/// Supported source language. `c++` aliases to `Cpp` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Go,
    Rust,
}

impl Language {
    /// The filename the source is materialized as inside the sandbox.
    pub fn source_filename(&self) -> &'static str {
        match self {
            Language::C => "source.c",
            Language::Cpp => "source.cpp",
            Language::Go => "main.go",
            Language::Rust => "main.rs",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            "go" => Ok(Language::Go),
            "rust" => Ok(Language::Rust),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Target CPU architecture. Closed set; unrecognized values are rejected
/// at deserialization rather than validated later as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86_64,
    Arm64,
    Arm,
}

impl Default for Architecture {
    fn default() -> Self {
        Architecture::X86_64
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
            Architecture::Arm => "arm",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Architecture::X86_64),
            "arm64" => Ok(Architecture::Arm64),
            "arm" => Ok(Architecture::Arm),
            other => Err(format!("unknown architecture: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Architecture {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Target operating system. Closed set, same rationale as [`Architecture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Windows,
    Macos,
}

impl Default for Os {
    fn default() -> Self {
        Os::Linux
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Os::Linux => "linux",
            Os::Windows => "windows",
            Os::Macos => "macos",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Os::Linux),
            "windows" => Ok(Os::Windows),
            "macos" => Ok(Os::Macos),
            other => Err(format!("unknown os: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Os {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Client-submitted compilation request.
#[derive(Debug, Clone, Serialize, Deserialize, validator::Validate)]
pub struct CompilationRequest {
    /// Base64-encoded source text.
    #[validate(length(min = 1, max = 2_097_152))]
    pub code: String,
    pub language: Language,
    /// `{family}-{version}`, e.g. `gcc-13`. Defaults per language if absent.
    #[serde(default)]
    pub compiler: Option<String>,
    /// Language-standard tag, e.g. `c++20`. Ignored for languages without one.
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub os: Os,
}

/// The resolved tuple a job executes against, loaded once at startup from
/// a declarative configuration with a hard-coded fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub language: Language,
    pub compiler: String,
    pub version: String,
    pub default_standard: Option<String>,
    pub architecture: String,
    pub os: String,
    /// The concrete sandbox image tag the backend consumes.
    pub image: String,
}

impl EnvironmentSpec {
    pub fn key(language: Language, compiler: &str) -> String {
        format!("{language}-{compiler}")
    }
}

/// Aggregated, per-language view of the loaded environment set, returned by
/// the environments query.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentSummary {
    pub language: Language,
    pub compilers: Vec<String>,
    pub standards: Vec<String>,
    pub oses: Vec<String>,
    pub architectures: Vec<String>,
}

/// Terminal and non-terminal job status. A pure function of the worker's
/// classification maps a [`crate::AppError`]/result to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Error
        )
    }
}

/// Lifecycle record for one submitted compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationJob {
    pub id: JobId,
    pub request: CompilationRequest,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompilationJob {
    pub fn new(id: JobId, request: CompilationRequest) -> Self {
        Self {
            id,
            request,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Terminal payload written by the worker once a job finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationResult {
    pub job_id: JobId,
    /// False only for infrastructure/validation failures.
    pub success: bool,
    /// True iff the sandbox exit code was zero and the job did not time out.
    pub compiled: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Wall-clock duration of the sandbox invocation, in nanoseconds.
    pub duration: i64,
    /// Present only when `success=false` or the job timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
