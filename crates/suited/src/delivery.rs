//! Publication of finished results to subscribers.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use suite_cache::TestCaseCache;
use suite_core::{GenerationReport, JobDescriptor};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredResult {
    pub job: JobDescriptor,
    pub report: GenerationReport,
    pub from_cache: bool,
}

pub trait ResultSubscriber: Send + Sync {
    fn on_result(&self, result: &DeliveredResult);
}

/// Decides which thread runs a publication.
pub trait DeliveryContext: Send + Sync {
    fn submit(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs publications on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDelivery;

impl DeliveryContext for InlineDelivery {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Queues publications for whichever thread drains the paired [`DeliveryQueue`].
pub struct ChannelDelivery {
    tx: Sender<Box<dyn FnOnce() + Send>>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, DeliveryQueue) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, DeliveryQueue { rx })
    }
}

impl DeliveryContext for ChannelDelivery {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) {
        if self.tx.send(task).is_err() {
            warn!("delivery queue closed, dropping publication");
        }
    }
}

pub struct DeliveryQueue {
    rx: Receiver<Box<dyn FnOnce() + Send>>,
}

impl DeliveryQueue {
    /// Runs every queued publication. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one publication and runs it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Feeds engine results back into the cache. Cached results are not stored
/// again.
pub struct CacheSubscriber {
    cache: Arc<TestCaseCache>,
}

impl CacheSubscriber {
    pub fn new(cache: Arc<TestCaseCache>) -> Self {
        Self { cache }
    }
}

impl ResultSubscriber for CacheSubscriber {
    fn on_result(&self, result: &DeliveredResult) {
        if result.from_cache {
            return;
        }
        let stored = self
            .cache
            .put_for_job(&result.job.file_id, &result.report, &result.job);
        debug!(job = %result.job.job_id, stored, "stored generated tests in cache");
    }
}

/// Hands `result` to every subscriber through `context`.
pub fn publish(
    context: &dyn DeliveryContext,
    subscribers: Vec<Arc<dyn ResultSubscriber>>,
    result: DeliveredResult,
) {
    context.submit(Box::new(move || {
        for subscriber in &subscribers {
            subscriber.on_result(&result);
        }
    }));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use suite_cache::TestCaseCache;
    use suite_core::{FileId, GenerationReport, JobDescriptor, JobId, TestCase};

    use super::{
        publish, CacheSubscriber, ChannelDelivery, DeliveredResult, InlineDelivery,
        ResultSubscriber,
    };

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl ResultSubscriber for Recorder {
        fn on_result(&self, result: &DeliveredResult) {
            self.seen
                .lock()
                .expect("recorder lock")
                .push((result.job.job_id.to_string(), result.from_cache));
        }
    }

    fn result(from_cache: bool) -> DeliveredResult {
        DeliveredResult {
            job: JobDescriptor::new(
                FileId::new("Pizza.java"),
                "com.example.Pizza",
                1,
                JobId::new("J1"),
                "target/classes",
            ),
            report: GenerationReport::from_test_cases(
                "com.example.Pizza",
                vec![TestCase::new("test_foo", "@Test void foo() {}", [5, 6, 7])],
            ),
            from_cache,
        }
    }

    #[test]
    fn inline_delivery_runs_before_returning() {
        let recorder = Arc::new(Recorder::default());
        let subscribers: Vec<Arc<dyn ResultSubscriber>> = vec![recorder.clone()];
        publish(&InlineDelivery, subscribers, result(false));
        assert_eq!(
            recorder.seen.lock().expect("recorder lock").clone(),
            vec![("J1".to_string(), false)]
        );
    }

    #[test]
    fn channel_delivery_runs_on_draining_thread() {
        let (delivery, queue) = ChannelDelivery::new();
        let recorder = Arc::new(Recorder::default());
        let subscribers: Vec<Arc<dyn ResultSubscriber>> = vec![recorder.clone()];

        let producer = thread::spawn(move || publish(&delivery, subscribers, result(true)));
        producer.join().expect("producer");
        assert!(recorder.seen.lock().expect("recorder lock").is_empty());

        assert!(queue.run_next(Duration::from_millis(500)));
        assert_eq!(queue.run_pending(), 0);
        assert_eq!(recorder.seen.lock().expect("recorder lock").len(), 1);
    }

    #[test]
    fn closed_queue_stops_waiting() {
        let (delivery, queue) = ChannelDelivery::new();
        drop(delivery);
        assert!(!queue.run_next(Duration::from_millis(10)));
    }

    #[test]
    fn cache_subscriber_stores_only_engine_results() {
        let cache = Arc::new(TestCaseCache::new());
        let subscriber = CacheSubscriber::new(Arc::clone(&cache));
        let file = FileId::new("Pizza.java");

        subscriber.on_result(&result(true));
        assert_eq!(cache.entry_count(&file), 0);

        subscriber.on_result(&result(false));
        assert_eq!(cache.entry_count(&file), 1);
        assert_eq!(
            cache
                .job_for_test(&file, "@Test void foo() {}")
                .map(|job| job.job_id),
            Some(JobId::new("J1"))
        );
    }
}
