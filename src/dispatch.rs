use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    backend::SynthesisBackend,
    error::{GenError, Result},
    feed::FeedBroadcast,
    models::{FeedEvent, GenerationRequest, PredictPayload},
};

/// Synthesis steps for the current load: fewer steps when busier, never below one.
pub fn steps_for_load(concurrent_requests: usize) -> u32 {
    let steps = (6.0 - concurrent_requests as f64 / 2.0).max(1.0);
    // half-up; `steps` is positive so `round` agrees
    steps.round() as u32
}

/// Running total of time spent waiting on the backend. Never reset.
pub struct BackendWaitMetrics {
    started: Instant,
    waited_nanos: AtomicU64,
    calls: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitSnapshot {
    pub calls: u64,
    pub waited_ms: u64,
    pub uptime_ms: u64,
    pub wait_fraction: f64,
}

impl BackendWaitMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            waited_nanos: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub fn record(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.waited_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn wait_fraction(&self) -> f64 {
        let uptime = self.started.elapsed().as_nanos() as f64;
        if uptime == 0.0 {
            return 0.0;
        }
        (self.waited_nanos.load(Ordering::Relaxed) as f64 / uptime).min(1.0)
    }

    pub fn snapshot(&self) -> WaitSnapshot {
        WaitSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            waited_ms: self.waited_nanos.load(Ordering::Relaxed) / 1_000_000,
            uptime_ms: self.started.elapsed().as_millis() as u64,
            wait_fraction: self.wait_fraction(),
        }
    }
}

impl Default for BackendWaitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts generations currently inside the service.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
}

pub struct InFlightGuard<'a> {
    counter: &'a InFlight,
    load: usize,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> InFlightGuard<'_> {
        let load = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        InFlightGuard { counter: self, load }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

impl InFlightGuard<'_> {
    /// Concurrent generations at the moment this one entered, itself included.
    pub fn load(&self) -> usize {
        self.load
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ComputeDispatcher {
    backend: Arc<dyn SynthesisBackend>,
    feed: FeedBroadcast,
    metrics: BackendWaitMetrics,
    artifact_grace: Duration,
}

impl ComputeDispatcher {
    pub fn new(backend: Arc<dyn SynthesisBackend>, feed: FeedBroadcast, artifact_grace: Duration) -> Self {
        Self {
            backend,
            feed,
            metrics: BackendWaitMetrics::new(),
            artifact_grace,
        }
    }

    pub fn metrics(&self) -> &BackendWaitMetrics {
        &self.metrics
    }

    pub fn build_payload(request: &GenerationRequest, steps: u32) -> PredictPayload {
        let params = &request.params;
        let mut payload = PredictPayload::new(request.prompts.clone(), steps);
        payload.height = params.height;
        payload.width = Some(params.width);
        payload.seed = params.seed;
        payload.model = Some(params.model.clone());
        payload.priority = request.priority;
        payload
    }

    /// One backend invocation. Returns raw image buffers in prompt order.
    pub async fn dispatch(&self, request: &GenerationRequest, concurrent_requests: usize) -> Result<Vec<Vec<u8>>> {
        let steps = steps_for_load(concurrent_requests);
        log::info!(
            "Dispatching {} prompt(s) with {} steps at {} concurrent requests",
            request.prompts.len(),
            steps,
            concurrent_requests
        );

        if !request.nofeed {
            for prompt in &request.prompts {
                self.feed.publish(FeedEvent::new(prompt.clone(), steps, concurrent_requests));
            }
        }

        let payload = Self::build_payload(request, steps);

        let call_started = Instant::now();
        let outcome = self.backend.predict(&payload).await;
        self.metrics.record(call_started.elapsed());
        log::debug!(
            "Backend wait fraction: {:.2}%",
            self.metrics.wait_fraction() * 100.0
        );

        let outputs = outcome?;
        if outputs.is_empty() {
            return Err(GenError::InvalidOutput("Backend returned no outputs".to_string()));
        }
        if outputs.len() != request.prompts.len() {
            log::warn!(
                "Backend returned {} outputs for {} prompts",
                outputs.len(),
                request.prompts.len()
            );
        }

        let mut buffers = Vec::with_capacity(outputs.len());
        for output in outputs {
            let path = PathBuf::from(&output.output_path);
            log::debug!("Reading image from {}", path.display());
            let buffer = tokio::fs::read(&path).await.map_err(|e| {
                GenError::InvalidOutput(format!("Failed to read backend output {}: {}", path.display(), e))
            })?;
            self.schedule_removal(path);
            buffers.push(buffer);
        }

        Ok(buffers)
    }

    fn schedule_removal(&self, path: PathBuf) {
        let grace = self.artifact_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                log::warn!("Failed to remove backend output {}: {}", path.display(), e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictOutput, RawParams};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FileBackend {
        dir: tempfile::TempDir,
        seen: Mutex<Vec<PredictPayload>>,
        status: Option<u16>,
    }

    impl FileBackend {
        fn new(status: Option<u16>) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                seen: Mutex::new(Vec::new()),
                status,
            }
        }
    }

    #[async_trait]
    impl SynthesisBackend for FileBackend {
        async fn predict(&self, payload: &PredictPayload) -> Result<Vec<PredictOutput>> {
            self.seen.lock().unwrap().push(payload.clone());
            if let Some(status) = self.status {
                return Err(GenError::Backend {
                    status,
                    message: "unavailable".into(),
                });
            }
            let mut outputs = Vec::new();
            for (i, prompt) in payload.prompts.iter().enumerate() {
                let path = self.dir.path().join(format!("out-{}.jpg", i));
                std::fs::write(&path, prompt.as_bytes()).unwrap();
                outputs.push(PredictOutput {
                    output_path: path.display().to_string(),
                });
            }
            Ok(outputs)
        }
    }

    /// Answers every call with the same output list, whatever is on disk.
    struct FixedBackend(Vec<PredictOutput>);

    #[async_trait]
    impl SynthesisBackend for FixedBackend {
        async fn predict(&self, _payload: &PredictPayload) -> Result<Vec<PredictOutput>> {
            Ok(self.0.clone())
        }
    }

    fn request(prompts: &[&str]) -> GenerationRequest {
        GenerationRequest::new(
            prompts.iter().map(|p| p.to_string()).collect(),
            &RawParams::new().with_width(640).with_height(480).with_seed(3),
        )
        .with_priority(2)
    }

    #[test]
    fn test_steps_follow_load() {
        assert_eq!(steps_for_load(0), 6);
        assert_eq!(steps_for_load(1), 6);
        assert_eq!(steps_for_load(2), 5);
        assert_eq!(steps_for_load(3), 5);
        assert_eq!(steps_for_load(4), 4);
        assert_eq!(steps_for_load(10), 1);
        assert_eq!(steps_for_load(20), 1);
    }

    #[test]
    fn test_payload_carries_normalized_params() {
        let payload = ComputeDispatcher::build_payload(&request(&["a"]), 4);
        assert_eq!(payload.steps, 4);
        assert_eq!(payload.width, Some(640));
        assert_eq!(payload.height, 480);
        assert_eq!(payload.seed, Some(3));
        assert_eq!(payload.model.as_deref(), Some("turbo"));
        assert_eq!(payload.priority, Some(2));
    }

    #[test]
    fn test_in_flight_guard() {
        let counter = InFlight::new();
        let first = counter.enter();
        let second = counter.enter();
        assert_eq!(first.load(), 1);
        assert_eq!(second.load(), 2);
        drop(first);
        assert_eq!(counter.current(), 1);
        drop(second);
        assert_eq!(counter.current(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_reads_outputs_and_announces() {
        let backend = Arc::new(FileBackend::new(None));
        let feed = FeedBroadcast::new(8);
        let mut listener = feed.subscribe();
        let dispatcher = ComputeDispatcher::new(backend.clone(), feed, Duration::from_millis(20));

        let buffers = dispatcher.dispatch(&request(&["one", "two"]), 1).await.unwrap();
        assert_eq!(buffers, vec![b"one".to_vec(), b"two".to_vec()]);

        let first = listener.recv().await.unwrap();
        let second = listener.recv().await.unwrap();
        assert_eq!((first.prompt.as_str(), second.prompt.as_str()), ("one", "two"));
        assert_eq!(first.steps, 6);

        assert_eq!(dispatcher.metrics().snapshot().calls, 1);

        let artifact = backend.dir.path().join("out-0.jpg");
        assert!(artifact.exists());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_nofeed_suppresses_events() {
        let backend = Arc::new(FileBackend::new(None));
        let feed = FeedBroadcast::new(8);
        let mut listener = feed.subscribe();
        let dispatcher = ComputeDispatcher::new(backend, feed, Duration::from_millis(1));

        dispatcher
            .dispatch(&request(&["quiet"]).with_nofeed(true), 1)
            .await
            .unwrap();
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_success_status_is_backend_error() {
        let backend = Arc::new(FileBackend::new(Some(503)));
        let dispatcher = ComputeDispatcher::new(backend.clone(), FeedBroadcast::new(8), Duration::ZERO);

        let err = dispatcher.dispatch(&request(&["x"]), 1).await.unwrap_err();
        assert!(matches!(err, GenError::Backend { status: 503, .. }));
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.metrics().snapshot().calls, 1);
    }

    #[tokio::test]
    async fn test_empty_output_list_is_invalid_output() {
        let dispatcher = ComputeDispatcher::new(Arc::new(FixedBackend(Vec::new())), FeedBroadcast::new(8), Duration::ZERO);

        let err = dispatcher.dispatch(&request(&["x"]), 1).await.unwrap_err();
        assert!(matches!(err, GenError::InvalidOutput(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreadable_output_path_is_invalid_output() {
        let missing = PredictOutput {
            output_path: "/nonexistent/rgen-missing-output.jpg".to_string(),
        };
        let dispatcher = ComputeDispatcher::new(Arc::new(FixedBackend(vec![missing])), FeedBroadcast::new(8), Duration::ZERO);

        let err = dispatcher.dispatch(&request(&["x"]), 1).await.unwrap_err();
        assert!(matches!(err, GenError::InvalidOutput(_)));
        assert!(err.is_retryable());
    }
}
