//! Background execution queue.
//!
//! An embedder that doesn't want to await `Engine::execute` inline enqueues
//! an [`ExecutionJob`] and polls [`JobQueue::status`] (or subscribes to the
//! job's own [`Storage`](nebula_storage::Storage)'s event bus) instead. A
//! [`Worker`] drains the queue one job at a time — no retries; a failed job
//! is logged and recorded `Failed`, and the worker moves on.

use std::sync::Arc;

use dashmap::DashMap;
use nebula_core::id::JobId;
use nebula_node::{Connection, NodeData};
use nebula_storage::Storage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::metrics::EngineMetrics;
use crate::options::ExecutionOptions;

/// One unit of background work: a graph plus the scope to run it under.
pub struct ExecutionJob {
    pub id: JobId,
    pub nodes: Vec<NodeData>,
    pub connections: Vec<Connection>,
    pub storage: Arc<dyn Storage>,
    pub user_ctx: serde_json::Value,
    pub options: ExecutionOptions,
}

impl ExecutionJob {
    #[must_use]
    pub fn new(nodes: Vec<NodeData>, connections: Vec<Connection>, storage: Arc<dyn Storage>) -> Self {
        Self {
            id: JobId::v4(),
            nodes,
            connections,
            storage,
            user_ctx: serde_json::Value::Null,
            options: ExecutionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_user_ctx(mut self, user_ctx: serde_json::Value) -> Self {
        self.user_ctx = user_ctx;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

/// Multi-producer handle for enqueuing [`ExecutionJob`]s. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<ExecutionJob>,
    statuses: Arc<DashMap<JobId, JobStatus>>,
    metrics: Arc<EngineMetrics>,
}

impl JobQueue {
    /// A queue and its paired worker, sharing `metrics` with the `engine`
    /// the worker will eventually run against.
    #[must_use]
    pub fn new(metrics: Arc<EngineMetrics>) -> (Self, Worker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let statuses = Arc::new(DashMap::new());
        let queue = Self { sender, statuses: statuses.clone(), metrics: metrics.clone() };
        let worker = Worker { receiver, statuses, metrics };
        (queue, worker)
    }

    /// Enqueue a job, returning its id immediately. If every worker for
    /// this queue has already been dropped, the job is recorded `Failed`
    /// and never runs.
    pub fn enqueue(&self, job: ExecutionJob) -> JobId {
        let id = job.id;
        self.statuses.insert(id, JobStatus::Queued);
        self.metrics.record_job_enqueued();
        if self.sender.send(job).is_err() {
            self.statuses
                .insert(id, JobStatus::Failed("no worker attached to this queue".to_string()));
        }
        id
    }

    #[must_use]
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.statuses.get(&id).map(|entry| entry.clone())
    }
}

/// Drains a [`JobQueue`], running each job through an [`Engine`] in
/// sequence.
pub struct Worker {
    receiver: mpsc::UnboundedReceiver<ExecutionJob>,
    statuses: Arc<DashMap<JobId, JobStatus>>,
    metrics: Arc<EngineMetrics>,
}

impl Worker {
    /// Drain jobs until the queue's last sender is dropped or `cancel`
    /// fires. Jobs already dequeued when `cancel` fires are recorded
    /// `Cancelled` rather than run.
    pub async fn run(mut self, engine: Engine, cancel: CancellationToken) {
        loop {
            let job = tokio::select! {
                job = self.receiver.recv() => job,
                () = cancel.cancelled() => None,
            };
            let Some(job) = job else {
                break;
            };

            if cancel.is_cancelled() {
                self.statuses.insert(job.id, JobStatus::Cancelled);
                continue;
            }

            let id = job.id;
            self.statuses.insert(id, JobStatus::Running);
            let result = engine
                .execute(&job.nodes, &job.connections, job.storage, job.user_ctx, job.options, cancel.clone())
                .await;
            self.metrics.record_job_completed();

            match result {
                Ok(()) => {
                    info!(job_id = %id, "background job completed");
                    self.statuses.insert(id, JobStatus::Completed);
                }
                Err(err) if err.is_cancelled() => {
                    self.statuses.insert(id, JobStatus::Cancelled);
                }
                Err(err) => {
                    warn!(job_id = %id, error = %err, "background job failed");
                    self.statuses.insert(id, JobStatus::Failed(err.to_string()));
                }
            }
        }
    }
}
