//! The worker pool (C4): a fixed-size set of worker loops draining a
//! bounded FIFO queue of admitted jobs.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use olympus_common::types::{CompilationJob, JobStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::compiler::Compiler;
use crate::store::JobStore;

/// Submission outcome for a job offered to the pool's queue.
pub enum Admission {
    Accepted,
    RejectedQueueFull,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    queued: AtomicUsize,
    processed: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeout: AtomicU64,
    error: AtomicU64,
}

/// Point-in-time snapshot of the pool's counters, returned by the
/// worker-stats endpoint.
#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub available_slots: usize,
    pub queued: usize,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeout: u64,
    pub error: u64,
    pub uptime_secs: u64,
    pub start_time: DateTime<Utc>,
}

pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<CompilationJob>>>,
    counters: Arc<Counters>,
    total_workers: usize,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `worker_count` loops draining a queue of capacity `queue_capacity`.
    pub fn spawn(
        worker_count: usize,
        queue_capacity: usize,
        compiler: Arc<Compiler>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let counters = Arc::new(Counters::default());
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let receiver = receiver.clone();
            let compiler = compiler.clone();
            let store = store.clone();
            let counters = counters.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(receiver, compiler, store, counters).await;
            }));
        }

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            counters,
            total_workers: worker_count,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            handles: std::sync::Mutex::new(handles),
        }
    }

    /// Non-blocking fast path: returns immediately whether the queue had
    /// space for `job`. Rejects without enqueuing once the pool has begun
    /// shutting down.
    pub fn try_submit(&self, job: CompilationJob) -> Admission {
        let sender = {
            let guard = self.sender.lock().expect("pool sender mutex poisoned");
            guard.clone()
        };
        let Some(sender) = sender else {
            return Admission::RejectedQueueFull;
        };
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(job) {
            Ok(()) => Admission::Accepted,
            Err(_) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                Admission::RejectedQueueFull
            }
        }
    }

    pub fn available_slots(&self) -> usize {
        self.total_workers
            .saturating_sub(self.counters.active.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_workers: self.total_workers,
            active_workers: self.counters.active.load(Ordering::SeqCst),
            available_slots: self.available_slots(),
            queued: self.counters.queued.load(Ordering::SeqCst),
            processed: self.counters.processed.load(Ordering::SeqCst),
            successful: self.counters.successful.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            timeout: self.counters.timeout.load(Ordering::SeqCst),
            error: self.counters.error.load(Ordering::SeqCst),
            uptime_secs: self.started_at.elapsed().as_secs(),
            start_time: self.started_at_utc,
        }
    }

    /// Stops accepting new work, closes the queue, and blocks until every
    /// worker finishes its current job.
    pub async fn close(&self) {
        self.sender
            .lock()
            .expect("pool sender mutex poisoned")
            .take();
        let handles = std::mem::take(&mut *self.handles.lock().expect("pool handles mutex poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<CompilationJob>>>,
    compiler: Arc<Compiler>,
    store: Arc<dyn JobStore>,
    counters: Arc<Counters>,
) {
    loop {
        let job = {
            let mut guard = receiver.lock().await;
            guard.recv().await
        };
        let Some(mut job) = job else {
            return;
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.active.fetch_add(1, Ordering::SeqCst);

        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        if let Err(e) = store.store(job.clone()).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to persist processing status");
        }

        let result = compiler.compile(&job).await;

        job.completed_at = Some(Utc::now());
        job.status = classify(&result);
        record_outcome(&counters, job.status);

        if let Err(e) = store.store_result(job.id, result).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to persist result");
        }
        if let Err(e) = store.store(job.clone()).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to persist terminal status");
        }

        counters.active.fetch_sub(1, Ordering::SeqCst);
        counters.processed.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            job_id = %job.id,
            language = %job.request.language,
            status = ?job.status,
            "job finished"
        );
    }
}

fn classify(result: &olympus_common::types::CompilationResult) -> JobStatus {
    if !result.success {
        return JobStatus::Error;
    }
    match result.error.as_deref() {
        Some("compilation timeout") => JobStatus::Timeout,
        _ if result.compiled => JobStatus::Completed,
        _ => JobStatus::Failed,
    }
}

fn record_outcome(counters: &Counters, status: JobStatus) {
    match status {
        JobStatus::Completed => counters.successful.fetch_add(1, Ordering::SeqCst),
        JobStatus::Failed => counters.failed.fetch_add(1, Ordering::SeqCst),
        JobStatus::Timeout => counters.timeout.fetch_add(1, Ordering::SeqCst),
        JobStatus::Error => counters.error.fetch_add(1, Ordering::SeqCst),
        _ => 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use olympus_common::error::AppError;
    use olympus_common::types::{Architecture, CompilationRequest, Language, Os};
    use std::time::Duration;

    struct SlowBackend;

    #[async_trait]
    impl crate::sandbox::SandboxBackend for SlowBackend {
        async fn compile(
            &self,
            _cfg: crate::sandbox::SandboxConfig,
        ) -> Result<crate::sandbox::SandboxOutput, AppError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(crate::sandbox::SandboxOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                duration: Duration::from_millis(50),
                timed_out: false,
            })
        }

        async fn image_exists(&self, _image: &str) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn close(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn sample_job() -> CompilationJob {
        CompilationJob::new(
            uuid::Uuid::new_v4(),
            CompilationRequest {
                code: "aW50IG1haW4oKXt9".to_string(),
                language: Language::Cpp,
                compiler: None,
                standard: None,
                architecture: Architecture::X86_64,
                os: Os::Linux,
            },
        )
    }

    #[tokio::test]
    async fn zero_workers_means_zero_available_slots() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        let compiler = Arc::new(Compiler::new(
            Arc::new(SlowBackend),
            Arc::new(crate::environments::EnvironmentRegistry::hardcoded()),
            Duration::from_secs(30),
        ));
        let pool = WorkerPool::spawn(0, 10, compiler, store);
        assert_eq!(pool.available_slots(), 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn queue_full_is_rejected() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        let compiler = Arc::new(Compiler::new(
            Arc::new(SlowBackend),
            Arc::new(crate::environments::EnvironmentRegistry::hardcoded()),
            Duration::from_secs(30),
        ));
        // A single worker, queue capacity 1: the first submit is picked up
        // immediately, the second fills the queue, the third overflows it.
        let pool = WorkerPool::spawn(1, 1, compiler, store);

        let first = pool.try_submit(sample_job());
        assert!(matches!(first, Admission::Accepted));
        let second = pool.try_submit(sample_job());
        assert!(matches!(second, Admission::Accepted));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let third = pool.try_submit(sample_job());
        let fourth = pool.try_submit(sample_job());
        let rejected = matches!(third, Admission::RejectedQueueFull)
            || matches!(fourth, Admission::RejectedQueueFull);
        assert!(rejected);

        pool.close().await;
    }
}
