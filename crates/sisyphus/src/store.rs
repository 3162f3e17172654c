//! The job store (C3): two mappings, `id -> CompilationJob` and
//! `id -> CompilationResult`, behind one interface so handlers and
//! workers never depend on which backend is active.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use olympus_common::error::AppError;
use olympus_common::types::{CompilationJob, CompilationResult, JobId};
use tokio::sync::RwLock;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn store(&self, job: CompilationJob) -> Result<(), AppError>;
    async fn get(&self, id: JobId) -> Result<Option<CompilationJob>, AppError>;
    async fn store_result(&self, id: JobId, result: CompilationResult) -> Result<(), AppError>;
    async fn get_result(&self, id: JobId) -> Result<Option<CompilationResult>, AppError>;
    async fn close(&self) -> Result<(), AppError>;
}

/// The reference implementation: a concurrent in-process map. Entries are
/// kept for the process lifetime — no eviction, no max-count enforcement.
/// Restart loses all jobs by design.
#[derive(Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<JobId, CompilationJob>>,
    results: RwLock<HashMap<JobId, CompilationResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn store(&self, job: CompilationJob) -> Result<(), AppError> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<CompilationJob>, AppError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn store_result(&self, id: JobId, result: CompilationResult) -> Result<(), AppError> {
        self.results.write().await.insert(id, result);
        Ok(())
    }

    async fn get_result(&self, id: JobId) -> Result<Option<CompilationResult>, AppError> {
        Ok(self.results.read().await.get(&id).cloned())
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Alternate implementation for when multiple service replicas must share
/// state: a remote key-value store with a TTL, selected when `REDIS_URL`
/// is configured. No durability guarantee beyond that TTL is promised.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

const RESULT_TTL_SECS: u64 = 24 * 60 * 60;

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let cfg = deadpool_redis::Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| AppError::Internal(format!("redis pool: {e}")))?;
        Ok(Self { pool })
    }

    fn job_key(id: JobId) -> String {
        format!("sisyphus:job:{id}")
    }

    fn result_key(id: JobId) -> String {
        format!("sisyphus:result:{id}")
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn store(&self, job: CompilationJob) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        let payload = serde_json::to_string(&job)
            .map_err(|e| AppError::Internal(format!("serialize job: {e}")))?;
        redis::cmd("SETEX")
            .arg(Self::job_key(job.id))
            .arg(RESULT_TTL_SECS)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))
    }

    async fn get(&self, id: JobId) -> Result<Option<CompilationJob>, AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::job_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| AppError::Internal(format!("deserialize job: {e}"))))
            .transpose()
    }

    async fn store_result(&self, id: JobId, result: CompilationResult) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        let payload = serde_json::to_string(&result)
            .map_err(|e| AppError::Internal(format!("serialize result: {e}")))?;
        redis::cmd("SETEX")
            .arg(Self::result_key(id))
            .arg(RESULT_TTL_SECS)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))
    }

    async fn get_result(&self, id: JobId) -> Result<Option<CompilationResult>, AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::result_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("redis: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| AppError::Internal(format!("deserialize result: {e}")))
        })
        .transpose()
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn build_store(redis_url: Option<&str>) -> Result<Arc<dyn JobStore>, AppError> {
    match redis_url {
        Some(url) => Ok(Arc::new(RedisStore::new(url)?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}
