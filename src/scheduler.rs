use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::ProgressBar;
use log::{debug, info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::auth::{Credentials, Token};
use crate::client::ApiClient;
use crate::error::{ExtractError, Result};
use crate::obfuscate::{LogScrubber, Obfuscate};
use crate::persist::Persister;
use crate::resource::{ResourcePath, AUXILIARY_PATHS};
use crate::types::{ListResponse, Pipeline};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_LOG_EVENTS: usize = 50;

/// How build and release logs are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Plain GET of the logs endpoint
    Raw,
    /// Subscribe to the logs endpoint as an event stream and keep up to `max_events`
    Stream { max_events: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Maximum number of fan-out tasks running at the same time
    pub concurrency: usize,
    pub log_mode: LogMode,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            log_mode: LogMode::Raw,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pipelines_extracted: usize,
    pub pipelines_skipped: usize,
    pub files_written: usize,
    /// Highest number of fan-out tasks observed running at once
    pub peak_concurrency: usize,
}

/// Counting semaphore that bounds the fan-out tasks of a pipeline.
///
/// A task holds a [`WorkerSlot`] from before it is spawned until it finishes,
/// successfully or not. The in-flight and peak counters exist so the bound can
/// be observed.
pub struct WorkerBudget {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl WorkerBudget {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Waits until a slot is free.
    pub async fn acquire(self: &Arc<Self>) -> Result<WorkerSlot> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| ExtractError::Task(format!("worker budget closed: {e}")))?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        Ok(WorkerSlot {
            _permit: permit,
            budget: Arc::clone(self),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// One occupied slot of a [`WorkerBudget`]; released on drop.
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    budget: Arc<WorkerBudget>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.budget.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a fan-out task needs, shared read-only across tasks.
struct TaskContext {
    client: Arc<ApiClient>,
    persister: Arc<Persister>,
    scrubber: Arc<LogScrubber>,
    token: Token,
    log_mode: LogMode,
}

impl TaskContext {
    async fn save_logs(&self, path: ResourcePath) -> Result<()> {
        let raw = match self.log_mode {
            LogMode::Raw => self.client.get_raw_bytes(&self.token, &path).await?,
            LogMode::Stream { max_events } => {
                self.client
                    .get_event_stream(&self.token, &path, max_events)
                    .await?
            }
        };

        self.persister.persist_bytes(&path, &self.scrubber.scrub(&raw))?;
        Ok(())
    }
}

/// A unit of fan-out work owning copies of the ids it operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchTask {
    Build { pipeline: String, id: String },
    Release { pipeline: String, id: String },
    Auxiliary { pipeline: String, sub_path: &'static str },
}

impl FetchTask {
    async fn run(self, ctx: &TaskContext) -> Result<()> {
        match self {
            Self::Build { pipeline, id } => {
                let path = ResourcePath::build(&pipeline, &id);
                let mut build = ctx.client.get_pipeline_build(&ctx.token, &path).await?;
                build.obfuscate();
                ctx.persister.persist_json(&path, &build)?;

                ctx.save_logs(ResourcePath::build_logs(&pipeline, &id)).await
            }
            Self::Release { pipeline, id } => {
                let path = ResourcePath::release(&pipeline, &id);
                let mut release = ctx.client.get_pipeline_release(&ctx.token, &path).await?;
                release.obfuscate();
                ctx.persister.persist_json(&path, &release)?;

                ctx.save_logs(ResourcePath::release_logs(&pipeline, &id)).await
            }
            Self::Auxiliary { pipeline, sub_path } => {
                let path = ResourcePath::auxiliary(&pipeline, sub_path);
                let bytes = ctx.client.get_raw_bytes(&ctx.token, &path).await?;
                ctx.persister.persist_bytes(&path, &bytes)?;
                Ok(())
            }
        }
    }
}

/// Walks the configured pipelines and writes a complete, obfuscated snapshot.
///
/// Pipelines are handled one after the other. For each pipeline the pipeline
/// itself and its build and release lists are saved first; then the single
/// builds, releases, logs and statistics are fetched in parallel, bounded by
/// the worker budget, and fully drained before the next pipeline starts.
/// The first error aborts the run.
pub struct Scheduler {
    client: Arc<ApiClient>,
    persister: Arc<Persister>,
    scrubber: Arc<LogScrubber>,
    options: ExtractOptions,
    budget: Arc<WorkerBudget>,
    progress: ProgressBar,
}

impl Scheduler {
    pub fn new(
        client: ApiClient,
        persister: Persister,
        scrubber: LogScrubber,
        options: ExtractOptions,
    ) -> Self {
        Self {
            client: Arc::new(client),
            persister: Arc::new(persister),
            scrubber: Arc::new(scrubber),
            budget: WorkerBudget::new(options.concurrency),
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports the pipeline currently being extracted on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Extracts every pipeline in `pipelines` (paths like `github.com/group/app`).
    ///
    /// # Errors
    ///
    /// Returns the first error hit by any fetch, decode or write; files saved
    /// before that point stay on disk but the snapshot is incomplete.
    pub async fn run(&self, credentials: &Credentials, pipelines: &[String]) -> Result<RunSummary> {
        let token = self
            .client
            .get_token(&credentials.client_id, &credentials.client_secret)
            .await?;

        let ctx = Arc::new(TaskContext {
            client: Arc::clone(&self.client),
            persister: Arc::clone(&self.persister),
            scrubber: Arc::clone(&self.scrubber),
            token,
            log_mode: self.options.log_mode,
        });

        let pipelines = unique_pipelines(pipelines);
        let total = pipelines.len();
        let mut extracted = Vec::with_capacity(total);
        let mut skipped = 0;

        for (index, pipeline) in pipelines.into_iter().enumerate() {
            self.progress
                .set_message(format!("Extracting {pipeline} ({}/{total})", index + 1));

            match self.extract_pipeline(&ctx, pipeline).await? {
                Some(fetched) => extracted.push(fetched),
                None => skipped += 1,
            }
        }

        let pipelines_extracted = extracted.len();
        if extracted.is_empty() {
            warn!("No pipelines found, skipping {}", ResourcePath::pipelines());
        } else {
            self.persister
                .persist_json(&ResourcePath::pipelines(), &ListResponse::single_page(extracted))?;
        }

        Ok(RunSummary {
            pipelines_extracted,
            pipelines_skipped: skipped,
            files_written: self.persister.written_count(),
            peak_concurrency: self.budget.peak(),
        })
    }

    async fn extract_pipeline(
        &self,
        ctx: &Arc<TaskContext>,
        pipeline: &str,
    ) -> Result<Option<Pipeline>> {
        let Some(mut fetched) = ctx.client.get_pipeline(&ctx.token, pipeline).await? else {
            warn!("Pipeline {pipeline} not found, skipping");
            return Ok(None);
        };

        fetched.obfuscate();
        ctx.persister
            .persist_json(&ResourcePath::pipeline(pipeline), &fetched)?;

        let mut builds = ctx.client.get_pipeline_builds(&ctx.token, pipeline).await?;
        builds.obfuscate();
        builds.normalize_pagination();
        ctx.persister
            .persist_json(&ResourcePath::builds(pipeline), &builds)?;

        let mut releases = ctx
            .client
            .get_pipeline_releases(&ctx.token, pipeline)
            .await?;
        releases.obfuscate();
        releases.normalize_pagination();
        ctx.persister
            .persist_json(&ResourcePath::releases(pipeline), &releases)?;

        let tasks: Vec<FetchTask> = builds
            .items
            .iter()
            .map(|build| FetchTask::Build {
                pipeline: pipeline.to_string(),
                id: build.id.clone(),
            })
            .chain(releases.items.iter().map(|release| FetchTask::Release {
                pipeline: pipeline.to_string(),
                id: release.id.clone(),
            }))
            .chain(AUXILIARY_PATHS.iter().map(|&sub_path| FetchTask::Auxiliary {
                pipeline: pipeline.to_string(),
                sub_path,
            }))
            .collect();

        info!(
            "Pipeline {pipeline}: fetching {} builds, {} releases and {} statistics",
            builds.items.len(),
            releases.items.len(),
            AUXILIARY_PATHS.len()
        );
        self.fan_out(ctx, tasks).await?;

        Ok(Some(fetched))
    }

    /// Runs `tasks` with at most `concurrency` in flight and waits for all of them.
    async fn fan_out(&self, ctx: &Arc<TaskContext>, tasks: Vec<FetchTask>) -> Result<()> {
        let mut running = JoinSet::new();

        for task in tasks {
            let slot = self.budget.acquire().await?;

            // a slot frees up when a sibling finishes; stop early if it failed
            while let Some(finished) = running.try_join_next() {
                if let Err(err) = flatten(finished) {
                    running.shutdown().await;
                    return Err(err);
                }
            }

            let ctx = Arc::clone(ctx);
            running.spawn(async move {
                let _slot = slot;
                task.run(&ctx).await
            });
        }

        while let Some(finished) = running.join_next().await {
            if let Err(err) = flatten(finished) {
                running.shutdown().await;
                return Err(err);
            }
        }

        debug!(
            "Fan-out drained ({} of {} slots in use)",
            self.budget.in_flight(),
            self.budget.capacity()
        );
        Ok(())
    }
}

fn flatten(finished: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    finished.map_err(ExtractError::from).and_then(|result| result)
}

/// Trims entries, drops blanks and keeps the first occurrence of each path.
fn unique_pipelines(pipelines: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    pipelines
        .iter()
        .map(|p| p.trim().trim_matches('/'))
        .filter(|p| !p.is_empty())
        .filter(|p| {
            let first = seen.insert(*p);
            if !first {
                warn!("Pipeline {p} is listed more than once, extracting it once");
            }
            first
        })
        .collect()
}
