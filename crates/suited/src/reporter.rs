//! Fan-out of pipeline events: tracing, JSONL log, notifications, history.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use suite_core::{JobId, PipelineEvent, PipelineEventKind};
use suite_notify::{notification_for_event, NotificationDispatcher};
use tracing::{debug, info, warn};

use crate::event_log::JsonlEventLog;

const DEFAULT_HISTORY: usize = 512;

pub struct EventReporter {
    log: Option<JsonlEventLog>,
    dispatcher: NotificationDispatcher,
    history: Mutex<VecDeque<PipelineEvent>>,
    history_limit: usize,
}

impl EventReporter {
    pub fn new(log: Option<JsonlEventLog>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            log,
            dispatcher,
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY,
        }
    }

    /// No log file and no sinks; events are only traced and kept in memory.
    pub fn quiet() -> Self {
        Self::new(None, NotificationDispatcher::new(Vec::new()))
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn emit(&self, event: PipelineEvent) {
        trace_event(&event);

        if let Some(log) = &self.log {
            if let Err(err) = log.record(&event) {
                warn!(error = %err, "failed to append pipeline event");
            }
        }

        if let Some(message) = notification_for_event(&event) {
            self.dispatcher.dispatch(&message);
        }

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if self.history_limit == 0 {
            return;
        }
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event);
    }

    pub fn history(&self) -> Vec<PipelineEvent> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn events_for(&self, job_id: &JobId) -> Vec<PipelineEvent> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| &event.job_id == job_id)
            .cloned()
            .collect()
    }
}

fn trace_event(event: &PipelineEvent) {
    let job = event.job_id.as_str();
    match &event.kind {
        PipelineEventKind::StateChanged { from, to } => {
            info!(job, %from, %to, "job state changed")
        }
        PipelineEventKind::EngineProgress { fraction } => {
            debug!(job, fraction, "engine progress")
        }
        PipelineEventKind::Failed { kind, message } => {
            warn!(job, %kind, %message, "job failed")
        }
        PipelineEventKind::JobRejected { running } => {
            warn!(job, %running, "generation rejected, another job is running")
        }
        other => debug!(job, event = ?other, "pipeline event"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};
    use suite_core::{FailureKind, JobId, PipelineEvent, PipelineEventKind};
    use suite_notify::{
        NotificationDispatcher, NotificationMessage, NotificationSink, NotificationSinkKind,
        NotifyError,
    };

    use super::EventReporter;
    use crate::event_log::JsonlEventLog;

    #[derive(Clone, Default)]
    struct CaptureSink {
        titles: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationSink for CaptureSink {
        fn kind(&self) -> NotificationSinkKind {
            NotificationSinkKind::Log
        }

        fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
            self.titles
                .lock()
                .expect("capture lock")
                .push(message.title.clone());
            Ok(())
        }
    }

    fn event(job: &str, kind: PipelineEventKind) -> PipelineEvent {
        PipelineEvent::new(JobId::new(job), None, kind)
    }

    #[test]
    fn failures_notify_and_cancellation_stays_quiet() {
        let sink = CaptureSink::default();
        let reporter =
            EventReporter::new(None, NotificationDispatcher::new(vec![Box::new(sink.clone())]));

        reporter.emit(event("J1", PipelineEventKind::Cancelled));
        reporter.emit(event(
            "J1",
            PipelineEventKind::Failed {
                kind: FailureKind::BuildFailure,
                message: "exit 2".to_string(),
            },
        ));

        assert_eq!(
            sink.titles.lock().expect("capture lock").clone(),
            vec!["Project build failed".to_string()]
        );
        assert_eq!(reporter.history().len(), 2);
    }

    #[test]
    fn history_is_bounded_and_filterable() {
        let reporter = EventReporter::quiet().with_history_limit(2);
        reporter.emit(event("J1", PipelineEventKind::ResultDropped));
        reporter.emit(event("J2", PipelineEventKind::ResultDropped));
        reporter.emit(event("J2", PipelineEventKind::Cancelled));

        let history = reporter.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|event| event.job_id == JobId::new("J2")));
        assert!(reporter.events_for(&JobId::new("J1")).is_empty());
        assert_eq!(reporter.events_for(&JobId::new("J2")).len(), 2);
    }

    #[test]
    fn events_are_appended_to_log_when_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlEventLog::new(dir.path());
        let reporter = EventReporter::new(
            Some(log.clone()),
            NotificationDispatcher::new(Vec::new()),
        );
        reporter.emit(event("J7", PipelineEventKind::CacheHit { tests: 2 }));

        let body = fs::read_to_string(log.job_log_path(&JobId::new("J7"))).expect("job log");
        assert!(body.contains("cache_hit"));
    }
}
