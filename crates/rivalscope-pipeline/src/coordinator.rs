//! Collection coordinator: fans a comparison request out to one task per
//! (subject, source) pair and aggregates the results into a job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use rivalscope_core::{
    CollectionJob, CollectionProgress, ComparisonRequest, JobStatus, LedgerPatch, SourceResult,
    StageStatus, Subject,
};
use rivalscope_ledger::{LedgerError, Store};
use rivalscope_sources::CollectorRegistry;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::retry::retry_store_write;

/// Acknowledgement returned by [`Coordinator::start_job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedJob {
    pub job_id: Uuid,
    pub status: &'static str,
    pub estimated_duration_secs: u64,
}

/// Invoked once per job when collection reaches a terminal status.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_collection_finished(&self, job: &CollectionJob);
}

struct LiveJob {
    state: Mutex<CollectionJob>,
    done: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    registry: Arc<CollectorRegistry>,
    store: Arc<dyn Store>,
    hook: Option<Arc<dyn CompletionHook>>,
    live: RwLock<HashMap<Uuid, Arc<LiveJob>>>,
}

/// Owns in-flight collection jobs. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("registry", &self.inner.registry)
            .field("has_hook", &self.inner.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new(registry: Arc<CollectorRegistry>, store: Arc<dyn Store>) -> Self {
        Self::build(registry, store, None)
    }

    /// Like [`Coordinator::new`], calling `hook` whenever a job finishes.
    #[must_use]
    pub fn with_hook(
        registry: Arc<CollectorRegistry>,
        store: Arc<dyn Store>,
        hook: Arc<dyn CompletionHook>,
    ) -> Self {
        Self::build(registry, store, Some(hook))
    }

    fn build(
        registry: Arc<CollectorRegistry>,
        store: Arc<dyn Store>,
        hook: Option<Arc<dyn CompletionHook>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                hook,
                live: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registers the job in the ledger, spawns its collectors and returns
    /// without waiting on any of them.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::UnsupportedSource`] if a requested kind has no collector.
    /// - [`PipelineError::DuplicateRequest`] if the request id is already in the ledger.
    /// - [`PipelineError::Store`] if the ledger or snapshot write fails after
    ///   retries. The ledger record is then marked `Failed` with the cause.
    pub async fn start_job(&self, request: ComparisonRequest) -> Result<StartedJob, PipelineError> {
        let inner = &self.inner;
        if let Some(&kind) = request.sources.iter().find(|&&k| !inner.registry.contains(k)) {
            return Err(PipelineError::UnsupportedSource(kind));
        }

        match inner.store.create(&request.request_id).await {
            Ok(_) => {}
            Err(LedgerError::AlreadyExists(id)) => return Err(PipelineError::DuplicateRequest(id)),
            Err(e) => return Err(e.into()),
        }

        let job_id = Uuid::new_v4();
        let job = CollectionJob::new(job_id, &request);
        if let Err(e) = self.register(&job).await {
            self.abandon(&job, &e).await;
            return Err(e.into());
        }

        let pending: Vec<_> = job.pending.iter().copied().collect();
        let (done, _) = watch::channel(false);
        let live = Arc::new(LiveJob {
            state: Mutex::new(job),
            done,
            tasks: StdMutex::new(Vec::with_capacity(pending.len())),
        });
        inner.live.write().await.insert(job_id, Arc::clone(&live));

        tracing::info!(
            request_id = %request.request_id,
            %job_id,
            tasks = pending.len(),
            "collection job started"
        );

        for entry in pending {
            let Some(collector) = inner.registry.get(entry.kind) else {
                continue;
            };
            let subject_id = request.subject_id(entry.subject).to_owned();
            let area_id = request.area_id.clone();
            let this = self.clone();

            let handle = tokio::spawn(async move {
                let kind = collector.kind();
                let work = tokio::spawn(async move { collector.collect(&subject_id, &area_id).await });
                let result = match work.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(%job_id, source = %kind, error = %e, "collector task aborted");
                        SourceResult::failed(kind, format!("collector task aborted: {e}"))
                    }
                };
                this.record(job_id, entry.subject, result).await;
            });

            if let Ok(mut tasks) = live.tasks.lock() {
                tasks.push(handle);
            }
        }

        Ok(StartedJob {
            job_id,
            status: "started",
            estimated_duration_secs: estimate_secs(&inner.registry, &request),
        })
    }

    /// Stores the initial snapshot and marks collection `Running`.
    async fn register(&self, job: &CollectionJob) -> Result<(), LedgerError> {
        let store = &self.inner.store;
        retry_store_write("collection snapshot", || store.save_job(job)).await?;
        let patch = LedgerPatch::collection_started(job.job_id);
        retry_store_write("ledger", || store.update(&job.request_id, &patch)).await?;
        Ok(())
    }

    /// Marks a job that could not be registered as `Failed`, so its ledger
    /// record does not sit in `Pending` forever.
    async fn abandon(&self, job: &CollectionJob, cause: &LedgerError) {
        let reason = format!("collection job could not be registered: {cause}");
        let patch = LedgerPatch::collection_finished(StageStatus::Failed, Some(reason));
        let store = &self.inner.store;
        match retry_store_write("ledger", || store.update(&job.request_id, &patch)).await {
            Ok(_) => tracing::warn!(
                request_id = %job.request_id,
                job_id = %job.job_id,
                error = %cause,
                "collection job abandoned"
            ),
            Err(e) => tracing::error!(
                request_id = %job.request_id,
                job_id = %job.job_id,
                error = %e,
                "failed to record abandoned collection job"
            ),
        }
    }

    async fn record(&self, job_id: Uuid, subject: Subject, result: SourceResult) {
        let Some(live) = self.inner.live.read().await.get(&job_id).cloned() else {
            tracing::warn!(%job_id, "result arrived for unknown job");
            return;
        };

        let finished = {
            let mut job = live.state.lock().await;
            tracing::debug!(
                %job_id,
                %subject,
                source = %result.kind,
                status = ?result.status,
                "source collected"
            );
            if job.record(subject, result) {
                Some(job.clone())
            } else {
                None
            }
        };

        if let Some(job) = finished {
            let recorded = self.finish(&job).await;
            live.done.send_replace(true);
            // Without a ledger entry the live map is the only place the outcome survives.
            if recorded {
                self.inner.live.write().await.remove(&job_id);
                if let Some(hook) = &self.inner.hook {
                    hook.on_collection_finished(&job).await;
                }
            }
        }
    }

    /// Persists the final snapshot and the terminal ledger status. Returns
    /// whether the ledger write landed.
    async fn finish(&self, job: &CollectionJob) -> bool {
        let store = &self.inner.store;
        if let Err(e) = retry_store_write("collection snapshot", || store.save_job(job)).await {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to persist final snapshot");
        }

        let patch = match job.status {
            JobStatus::Failed => {
                LedgerPatch::collection_finished(StageStatus::Failed, job.failure_reason.clone())
            }
            _ => LedgerPatch::collection_finished(StageStatus::Completed, None),
        };
        match retry_store_write("ledger", || store.update(&job.request_id, &patch)).await {
            Ok(_) => {
                tracing::info!(
                    request_id = %job.request_id,
                    job_id = %job.job_id,
                    status = %job.status,
                    "collection job finished"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    request_id = %job.request_id,
                    job_id = %job.job_id,
                    error = %e,
                    "failed to record collection outcome in ledger; keeping job in memory"
                );
                false
            }
        }
    }

    /// Current snapshot of a job, live state first, then the stored snapshot.
    ///
    /// # Errors
    ///
    /// [`PipelineError::JobNotFound`] when neither knows the job.
    pub async fn status(&self, job_id: Uuid) -> Result<CollectionJob, PipelineError> {
        let live = self.inner.live.read().await.get(&job_id).cloned();
        if let Some(live) = live {
            return Ok(live.state.lock().await.clone());
        }
        match self.inner.store.load_job(job_id).await {
            Ok(job) => Ok(job),
            Err(LedgerError::JobNotFound(_)) => Err(PipelineError::JobNotFound(job_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Same as [`Coordinator::status`].
    pub async fn progress(&self, job_id: Uuid) -> Result<CollectionProgress, PipelineError> {
        Ok(self.status(job_id).await?.progress())
    }

    /// Resolves once the job is terminal and returns its final snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::status`].
    pub async fn wait(&self, job_id: Uuid) -> Result<CollectionJob, PipelineError> {
        let live = self.inner.live.read().await.get(&job_id).cloned();
        if let Some(live) = live {
            let mut done = live.done.subscribe();
            // The sender lives in `live`, so the channel cannot close here.
            let _ = done.wait_for(|finished| *finished).await;
            return Ok(live.state.lock().await.clone());
        }
        self.status(job_id).await
    }

    /// Number of jobs still collecting.
    pub async fn active_jobs(&self) -> usize {
        self.inner.live.read().await.len()
    }
}

/// Worst-case seconds for the slowest requested collector, rounded up.
fn estimate_secs(registry: &CollectorRegistry, request: &ComparisonRequest) -> u64 {
    let worst = registry.worst_case(request.sources.iter().copied());
    worst
        .as_secs()
        .saturating_add(u64::from(worst.subsec_nanos() > 0))
}
