#![allow(dead_code)]

use async_trait::async_trait;
use rgen_images::{
    BackendConfig, Config, GenError, ImageCompositor, ImageService, NoopClassifier,
    PredictOutput, PredictPayload, Result, RetryPolicy, SynthesisBackend,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Writes one file per prompt into a temp dir after a short delay.
pub struct StubBackend {
    dir: tempfile::TempDir,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    missing_outputs_left: AtomicUsize,
    delay: Duration,
    pub seen: Mutex<Vec<PredictPayload>>,
}

impl StubBackend {
    pub fn new(delay: Duration) -> Arc<Self> {
        Self::flaky(delay, 0)
    }

    /// Fails the first `failures` calls with a 500.
    pub fn flaky(delay: Duration, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            dir: tempfile::tempdir().unwrap(),
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
            missing_outputs_left: AtomicUsize::new(0),
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Answers the first `count` calls with output paths that were never written.
    pub fn with_missing_outputs(delay: Duration, count: usize) -> Arc<Self> {
        let backend = Self::new(delay);
        backend.missing_outputs_left.store(count, Ordering::SeqCst);
        backend
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for StubBackend {
    async fn predict(&self, payload: &PredictPayload) -> Result<Vec<PredictOutput>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(payload.clone());
        tokio::time::sleep(self.delay).await;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GenError::Backend {
                status: 500,
                message: "model crashed".into(),
            });
        }

        let missing = self
            .missing_outputs_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let mut outputs = Vec::new();
        for (i, prompt) in payload.prompts.iter().enumerate() {
            let path = self.dir.path().join(format!("call{}-{}.png", call, i));
            if missing {
                outputs.push(PredictOutput {
                    output_path: path.display().to_string(),
                });
                continue;
            }
            let body = format!("{}|seed={}", prompt, payload.seed.unwrap_or_default());
            std::fs::write(&path, body).unwrap();
            outputs.push(PredictOutput {
                output_path: path.display().to_string(),
            });
        }
        Ok(outputs)
    }
}

/// Appends a marker instead of shelling out to ImageMagick.
pub struct TaggingCompositor;

#[async_trait]
impl ImageCompositor for TaggingCompositor {
    async fn composite(&self, source: &Path, _overlay: &Path, output: &Path) -> Result<()> {
        let mut bytes = tokio::fs::read(source).await?;
        bytes.extend_from_slice(b"+logo");
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn blur(&self, source: &Path, output: &Path, _sigma: u32) -> Result<()> {
        tokio::fs::copy(source, output).await?;
        Ok(())
    }
}

pub fn test_config(retry: RetryPolicy) -> Config {
    Config::new()
        .with_backend(BackendConfig::new().with_artifact_grace(Duration::from_millis(10)))
        .with_retry(retry.with_backoff(Duration::ZERO, Duration::ZERO))
}

pub fn service_with(backend: Arc<StubBackend>, retry: RetryPolicy) -> ImageService {
    ImageService::new(
        &test_config(retry),
        backend,
        Arc::new(NoopClassifier),
        Arc::new(TaggingCompositor),
    )
}
