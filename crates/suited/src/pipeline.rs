//! Cache-first generation pipeline.
//!
//! A request first consults the [`TestCaseCache`] after static invalidation.
//! A hit is delivered straight away. A miss builds the project, runs the
//! engine, and hands the job to a [`ResultWatcher`] thread that publishes the
//! result file once it shows up. One job runs at a time.

use chrono::Utc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use suite_build::{BuildOutcome, BuildSupervisor};
use suite_cache::{StaticInvalidator, TestCaseCache};
use suite_core::{
    FileId, GenerationReport, GeneratorConfig, JobDescriptor, JobId, LineRange, PipelineEvent,
    PipelineEventKind, PipelineState, SourceStructure, TargetScope,
};
use suite_engine::{
    EngineAdapter, EngineError, EngineRequest, EngineStage, EngineStopReason, EngineSupervisor,
    JarEngineAdapter, ProgressUpdate,
};
use suite_notify::{NotificationDispatcher, NotificationPolicy};
use tracing::{debug, info, warn};

use crate::delivery::{
    publish, CacheSubscriber, DeliveredResult, DeliveryContext, InlineDelivery, ResultSubscriber,
};
use crate::error::{PipelineError, PipelineFailure};
use crate::event_log::JsonlEventLog;
use crate::pending::PendingJobTable;
use crate::reporter::EventReporter;
use crate::single_flight::SingleFlight;
use crate::state_machine::{self, StateTransition};
use crate::watcher::{ResultWatcher, WatchOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub file_id: FileId,
    pub class_fqn: String,
    pub scope: TargetScope,
    pub source_version: i64,
    /// Lines whose cached tests answer the request. `None` skips the lookup.
    pub lookup: Option<LineRange>,
    pub force_refresh: bool,
    /// Current method structure of the file, for static invalidation.
    pub source: Option<SourceStructure>,
}

impl GenerationRequest {
    pub fn new(file_id: FileId, class_fqn: impl Into<String>, scope: TargetScope) -> Self {
        Self {
            file_id,
            class_fqn: class_fqn.into(),
            scope,
            source_version: 0,
            lookup: None,
            force_refresh: false,
            source: None,
        }
    }

    pub fn with_lookup(mut self, lines: LineRange) -> Self {
        self.lookup = Some(lines);
        self
    }

    pub fn with_source(mut self, source: SourceStructure) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_source_version(mut self, version: i64) -> Self {
        self.source_version = version;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancellation flagged; the job ends in `Cancelled`.
    Requested,
    /// The engine already exited cleanly; the result will still be delivered.
    TooLate,
    AlreadyFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub state: PipelineState,
    pub progress: f64,
    pub stage: Option<EngineStage>,
    pub failure: Option<PipelineFailure>,
    pub report: Option<GenerationReport>,
    pub from_cache: bool,
}

struct JobStatus {
    state: PipelineState,
    progress: f64,
    stage: Option<EngineStage>,
    failure: Option<PipelineFailure>,
    report: Option<GenerationReport>,
    from_cache: bool,
    /// Set once a cache hit is being published; cancellation is refused.
    committed: bool,
}

struct JobShared {
    job_id: JobId,
    status: Mutex<JobStatus>,
    changed: Condvar,
    cancel: suite_core::CancelToken,
}

impl JobShared {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: Mutex::new(JobStatus {
                state: PipelineState::Created,
                progress: 0.0,
                stage: None,
                failure: None,
                report: None,
                from_cache: false,
                committed: false,
            }),
            changed: Condvar::new(),
            cancel: suite_core::CancelToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, status: &JobStatus) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id.clone(),
            state: status.state,
            progress: status.progress,
            stage: status.stage,
            failure: status.failure.clone(),
            report: status.report.clone(),
            from_cache: status.from_cache,
        }
    }
}

/// Caller-side view of one running job.
pub struct JobHandle {
    shared: Arc<JobShared>,
    pending: Arc<PendingJobTable>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.shared.job_id
    }

    pub fn state(&self) -> PipelineState {
        self.shared.lock().state
    }

    pub fn progress(&self) -> f64 {
        self.shared.lock().progress
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let status = self.shared.lock();
        self.shared.snapshot_of(&status)
    }

    /// Requests cancellation. Honoured until the engine has exited.
    pub fn cancel(&self) -> CancelOutcome {
        let status = self.shared.lock();
        if status.state.is_terminal() {
            CancelOutcome::AlreadyFinished
        } else if status.state.is_cancellable() && !status.committed {
            self.shared.cancel.cancel();
            self.pending.remove(&self.shared.job_id);
            info!(job = %self.shared.job_id, state = %status.state, "cancellation requested");
            CancelOutcome::Requested
        } else {
            CancelOutcome::TooLate
        }
    }

    /// Blocks until the job reaches a terminal state or `timeout` passes,
    /// then returns the latest snapshot either way.
    pub fn wait(&self, timeout: Duration) -> JobSnapshot {
        let status = self.shared.lock();
        let (status, _) = self
            .shared
            .changed
            .wait_timeout_while(status, timeout, |status| !status.state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.snapshot_of(&status)
    }
}

struct Services {
    config: GeneratorConfig,
    cache: Arc<TestCaseCache>,
    invalidator: Arc<StaticInvalidator>,
    pending: Arc<PendingJobTable>,
    flight: SingleFlight,
    build: BuildSupervisor,
    engine: EngineSupervisor,
    adapter: Arc<dyn EngineAdapter>,
    watcher: ResultWatcher,
    reporter: Arc<EventReporter>,
    delivery: Arc<dyn DeliveryContext>,
    subscribers: Mutex<Vec<Arc<dyn ResultSubscriber>>>,
}

pub struct PipelineBuilder {
    config: GeneratorConfig,
    cache: Option<Arc<TestCaseCache>>,
    adapter: Option<Arc<dyn EngineAdapter>>,
    reporter: Option<Arc<EventReporter>>,
    delivery: Option<Arc<dyn DeliveryContext>>,
}

impl PipelineBuilder {
    pub fn cache(mut self, cache: Arc<TestCaseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn reporter(mut self, reporter: EventReporter) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn DeliveryContext>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn build(self) -> PipelineOrchestrator {
        let config = self.config;
        let cache = self.cache.unwrap_or_default();
        let adapter: Arc<dyn EngineAdapter> = match self.adapter {
            Some(adapter) => adapter,
            None => Arc::new(JarEngineAdapter::new(config.engine.clone())),
        };
        let reporter = self.reporter.unwrap_or_else(|| {
            let log = config.log.event_log_root.clone().map(JsonlEventLog::new);
            let policy = NotificationPolicy::from(&config.notifications);
            Arc::new(EventReporter::new(
                log,
                NotificationDispatcher::from_policy(&policy),
            ))
        });
        let delivery: Arc<dyn DeliveryContext> = match self.delivery {
            Some(delivery) => delivery,
            None => Arc::new(InlineDelivery),
        };
        let subscribers: Vec<Arc<dyn ResultSubscriber>> =
            vec![Arc::new(CacheSubscriber::new(Arc::clone(&cache)))];

        PipelineOrchestrator {
            services: Arc::new(Services {
                build: BuildSupervisor::from_config(&config.build),
                engine: EngineSupervisor::from_config(&config.engine),
                watcher: ResultWatcher::from_config(&config.watcher),
                config,
                cache,
                invalidator: Arc::new(StaticInvalidator::new()),
                pending: Arc::new(PendingJobTable::new()),
                flight: SingleFlight::new(),
                adapter,
                reporter,
                delivery,
                subscribers: Mutex::new(subscribers),
            }),
        }
    }
}

pub struct PipelineOrchestrator {
    services: Arc<Services>,
}

impl PipelineOrchestrator {
    pub fn builder(config: GeneratorConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            cache: None,
            adapter: None,
            reporter: None,
            delivery: None,
        }
    }

    pub fn new(config: GeneratorConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.services.config
    }

    pub fn cache(&self) -> &Arc<TestCaseCache> {
        &self.services.cache
    }

    pub fn invalidator(&self) -> &Arc<StaticInvalidator> {
        &self.services.invalidator
    }

    pub fn pending(&self) -> &Arc<PendingJobTable> {
        &self.services.pending
    }

    pub fn reporter(&self) -> &Arc<EventReporter> {
        &self.services.reporter
    }

    pub fn running_job(&self) -> Option<JobId> {
        self.services.flight.current()
    }

    /// Adds a subscriber for every later delivery.
    pub fn subscribe(&self, subscriber: Arc<dyn ResultSubscriber>) {
        self.services
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Starts a job on its own thread. Rejected, not queued, while another
    /// job holds the single-flight permit.
    pub fn start(&self, request: GenerationRequest) -> Result<JobHandle, PipelineError> {
        if request.class_fqn.trim().is_empty() {
            return Err(PipelineError::InvalidRequest {
                message: "class name must not be empty".to_string(),
            });
        }

        let job_id = JobId::generate();
        let permit = match self.services.flight.try_acquire(&job_id) {
            Ok(permit) => permit,
            Err(running) => {
                self.services.reporter.emit(PipelineEvent::new(
                    job_id,
                    Some(request.file_id.clone()),
                    PipelineEventKind::JobRejected {
                        running: running.clone(),
                    },
                ));
                return Err(PipelineError::AlreadyRunning { running });
            }
        };

        let shared = Arc::new(JobShared::new(job_id.clone()));
        let run = JobRun {
            services: Arc::clone(&self.services),
            job: Arc::clone(&shared),
            request,
        };
        info!(job = %job_id, file = %run.request.file_id, class = %run.request.class_fqn, scope = run.request.scope.as_str(), "starting generation");
        thread::Builder::new()
            .name(format!("suitegen-{job_id}"))
            .spawn(move || {
                let _permit = permit;
                run.run();
            })
            .map_err(|source| PipelineError::ThreadSpawn { source })?;

        Ok(JobHandle {
            shared,
            pending: Arc::clone(&self.services.pending),
        })
    }
}

#[derive(Clone)]
struct JobRun {
    services: Arc<Services>,
    job: Arc<JobShared>,
    request: GenerationRequest,
}

impl JobRun {
    fn run(self) {
        if !self.advance(PipelineState::CacheCheck) {
            return;
        }
        if let Some(report) = self.check_cache() {
            self.deliver_cached(report);
            return;
        }

        self.services.pending.insert(self.descriptor());
        if !self.advance(PipelineState::Building) || !self.build() {
            return;
        }
        if !self.advance(PipelineState::Engine) || !self.run_engine() {
            return;
        }
        if !self.advance(PipelineState::ResultPending) {
            return;
        }
        self.schedule_watcher();
    }

    fn descriptor(&self) -> JobDescriptor {
        JobDescriptor::new(
            self.request.file_id.clone(),
            self.request.scope.target_unit(&self.request.class_fqn),
            self.request.source_version,
            self.job.job_id.clone(),
            self.services.config.project.classpath.clone(),
        )
    }

    fn emit(&self, kind: PipelineEventKind) {
        self.services.reporter.emit(PipelineEvent::new(
            self.job.job_id.clone(),
            Some(self.request.file_id.clone()),
            kind,
        ));
    }

    fn announce(&self, step: Option<StateTransition>) {
        if let Some(step) = step {
            self.job.changed.notify_all();
            self.emit(PipelineEventKind::StateChanged {
                from: step.from,
                to: step.to,
            });
        }
    }

    /// Moves to `to`, or to `Cancelled` if cancellation was requested.
    /// Returns whether the job should keep going.
    fn advance(&self, to: PipelineState) -> bool {
        let (step, cancelled) = {
            let mut status = self.job.lock();
            if self.job.cancel.is_cancelled() {
                (apply(&mut status, PipelineState::Cancelled), true)
            } else {
                (apply(&mut status, to), false)
            }
        };
        let moved = step.is_some();
        self.announce(step);
        if cancelled {
            self.finish_cancelled();
            return false;
        }
        moved
    }

    fn cancel_now(&self) {
        let step = apply(&mut self.job.lock(), PipelineState::Cancelled);
        self.announce(step);
        self.finish_cancelled();
    }

    fn finish_cancelled(&self) {
        self.services.pending.remove(&self.job.job_id);
        self.emit(PipelineEventKind::Cancelled);
    }

    /// Drops the pending entry and ends the job in `Errored`.
    fn fail(&self, failure: PipelineFailure) {
        self.services.pending.remove(&self.job.job_id);
        self.record_failure(failure);
    }

    fn record_failure(&self, failure: PipelineFailure) {
        self.emit(PipelineEventKind::Failed {
            kind: failure.code(),
            message: failure.to_string(),
        });
        let step = {
            let mut status = self.job.lock();
            status.failure = Some(failure);
            apply(&mut status, PipelineState::Errored)
        };
        self.announce(step);
    }

    fn publish(&self, job: JobDescriptor, report: GenerationReport, from_cache: bool) {
        let subscribers = self
            .services
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        publish(
            self.services.delivery.as_ref(),
            subscribers,
            DeliveredResult {
                job,
                report,
                from_cache,
            },
        );
    }

    fn check_cache(&self) -> Option<GenerationReport> {
        let file_id = &self.request.file_id;
        if let Some(source) = &self.request.source {
            let lines = self.services.invalidator.invalidate(file_id, source);
            if !lines.is_empty() {
                let dropped = self.services.cache.invalidate_lines(file_id, &lines);
                debug!(job = %self.job.job_id, file = %file_id, dropped, "invalidated changed methods");
                self.emit(PipelineEventKind::CacheInvalidated {
                    lines: lines.into_iter().collect(),
                });
            }
        }

        if self.request.force_refresh {
            return None;
        }
        let lines = self.request.lookup?;
        let tests = self.services.cache.get(file_id, lines.from, lines.to);
        if tests.is_empty() {
            debug!(job = %self.job.job_id, %lines, "cache miss");
            return None;
        }
        self.emit(PipelineEventKind::CacheHit { tests: tests.len() });
        Some(GenerationReport::from_test_cases(
            self.request.class_fqn.clone(),
            tests,
        ))
    }

    fn deliver_cached(&self, report: GenerationReport) {
        let committed = {
            let mut status = self.job.lock();
            if self.job.cancel.is_cancelled() {
                false
            } else {
                status.committed = true;
                true
            }
        };
        if !committed {
            self.cancel_now();
            return;
        }

        let tests = report.len();
        self.publish(self.descriptor(), report.clone(), true);
        self.emit(PipelineEventKind::ResultDelivered {
            tests,
            from_cache: true,
        });
        let step = {
            let mut status = self.job.lock();
            status.report = Some(report);
            status.from_cache = true;
            status.progress = 1.0;
            apply(&mut status, PipelineState::Delivered)
        };
        self.announce(step);
    }

    fn build(&self) -> bool {
        let config = &self.services.config;
        let result = match self.services.build.run(
            &config.project.root,
            &config.build.command,
            &self.job.cancel,
        ) {
            Ok(result) => result,
            Err(suite_build::BuildError::Spawn { command, source }) => {
                self.fail(PipelineFailure::Spawn {
                    what: format!("build `{command}`"),
                    message: source.to_string(),
                });
                return false;
            }
            Err(err) => {
                self.fail(PipelineFailure::Build {
                    message: err.to_string(),
                });
                return false;
            }
        };

        self.emit(PipelineEventKind::BuildFinished {
            success: result.success(),
            exit_code: result.exit_code,
        });
        match result.outcome {
            BuildOutcome::Succeeded => true,
            BuildOutcome::Cancelled => {
                self.cancel_now();
                false
            }
            BuildOutcome::Failed { .. } | BuildOutcome::TimedOut => {
                self.fail(PipelineFailure::Build {
                    message: result.summary(),
                });
                false
            }
        }
    }

    fn run_engine(&self) -> bool {
        let config = &self.services.config;
        let request = EngineRequest {
            job_id: self.job.job_id.clone(),
            project_root: config.project.root.clone(),
            class_fqn: self.request.class_fqn.clone(),
            scope: self.request.scope.clone(),
            classpath: config.project.classpath.clone(),
            results_dir: self.services.watcher.results_dir.clone(),
        };
        if let Err(err) = self.services.watcher.ensure_dir() {
            warn!(dir = %request.results_dir.display(), error = %err, "cannot create results directory");
        }
        if let Err(err) = self.services.adapter.preflight() {
            self.fail(self.engine_failure(err));
            return false;
        }
        self.emit(PipelineEventKind::EngineStarted {
            command: self.services.adapter.build_command(&request).render(),
        });

        let mut last_percent = None;
        let outcome = self.services.engine.run(
            &request,
            self.services.adapter.as_ref(),
            &self.job.cancel,
            &mut |update: ProgressUpdate| {
                {
                    let mut status = self.job.lock();
                    status.progress = update.fraction;
                    status.stage = Some(update.stage);
                }
                self.job.changed.notify_all();
                let percent = (update.fraction * 100.0).floor() as u32;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    self.emit(PipelineEventKind::EngineProgress {
                        fraction: update.fraction,
                    });
                }
            },
        );

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.fail(self.engine_failure(err));
                return false;
            }
        };
        self.emit(PipelineEventKind::EngineExited {
            exit_code: result.exit_code,
        });
        match result.stop_reason {
            EngineStopReason::Completed => true,
            EngineStopReason::Cancelled => {
                self.cancel_now();
                false
            }
            EngineStopReason::Timeout => {
                self.fail(PipelineFailure::EngineTimeout {
                    timeout_secs: self.services.engine.timeout.as_secs(),
                });
                false
            }
            EngineStopReason::Failed => {
                self.fail(PipelineFailure::EngineExit {
                    exit_code: result.exit_code,
                    reason: result.failure_reason.unwrap_or_default(),
                });
                false
            }
            EngineStopReason::Rejected => {
                self.fail(PipelineFailure::EngineRejected {
                    reason: result.failure_reason.unwrap_or_default(),
                });
                false
            }
        }
    }

    fn engine_failure(&self, err: EngineError) -> PipelineFailure {
        match err {
            EngineError::Spawn { command, source } => PipelineFailure::Spawn {
                what: format!("engine `{command}`"),
                message: source.to_string(),
            },
            EngineError::Runtime { source, .. } => PipelineFailure::EngineExit {
                exit_code: None,
                reason: format!("lost track of the engine process: {source}"),
            },
            EngineError::UnsupportedJava { .. } => PipelineFailure::JavaVersion {
                message: err.to_string(),
            },
            EngineError::InvalidRequest { message } => {
                PipelineFailure::InvalidEngineRequest { message }
            }
            EngineError::Pattern { .. } => PipelineFailure::Spawn {
                what: format!("engine via {}", self.services.adapter.name()),
                message: err.to_string(),
            },
        }
    }

    fn schedule_watcher(self) {
        let path = self.services.watcher.result_path(&self.job.job_id);
        self.emit(PipelineEventKind::ResultWatchStarted {
            path: path.display().to_string(),
        });

        let watcher = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("suitegen-watch-{}", self.job.job_id))
            .spawn(move || watcher.watch_result());
        if let Err(err) = spawned {
            self.fail(PipelineFailure::Spawn {
                what: "result watcher".to_string(),
                message: err.to_string(),
            });
        }
    }

    fn watch_result(&self) {
        let job_id = &self.job.job_id;
        match self.services.watcher.watch(job_id) {
            WatchOutcome::Found { path, report } => {
                let Some(descriptor) = self.services.pending.take(job_id) else {
                    debug!(job = %job_id, path = %path.display(), "no pending entry, dropping result");
                    self.emit(PipelineEventKind::ResultDropped);
                    let step = apply(&mut self.job.lock(), PipelineState::Errored);
                    self.announce(step);
                    return;
                };

                let tests = report.len();
                info!(job = %job_id, tests, "generation result delivered");
                self.publish(descriptor, report.clone(), false);
                self.emit(PipelineEventKind::ResultDelivered {
                    tests,
                    from_cache: false,
                });
                let step = {
                    let mut status = self.job.lock();
                    status.report = Some(report);
                    status.progress = 1.0;
                    apply(&mut status, PipelineState::Delivered)
                };
                self.announce(step);
            }
            WatchOutcome::TimedOut { path, waited } => {
                if self.services.config.watcher.prune_pending_on_timeout {
                    self.services.pending.remove(job_id);
                }
                self.record_failure(PipelineFailure::ResultTimeout {
                    path,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            WatchOutcome::Unreadable { path, message } => {
                self.fail(PipelineFailure::Parse { path, message });
            }
        }
    }
}

fn apply(status: &mut JobStatus, to: PipelineState) -> Option<StateTransition> {
    match state_machine::transition(&mut status.state, to, Utc::now()) {
        Ok(step) => Some(step),
        Err(err) => {
            warn!(error = %err, "ignoring state transition");
            None
        }
    }
}
