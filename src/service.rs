use serde::Serialize;
use std::sync::Arc;

use crate::{
    backend::{
        HttpModerationClassifier, HttpSynthesisBackend, ImageCompositor, ImageMagick,
        ModerationClassifier, NoopClassifier, SynthesisBackend,
    },
    cache::{CacheStats, GenerationCache},
    config::Config,
    dispatch::{ComputeDispatcher, InFlight, WaitSnapshot},
    error::Result,
    feed::FeedBroadcast,
    models::{GenerationRequest, GenerationResult},
    postprocess::{PostProcessOptions, PostProcessor},
    retry::RetryController,
};

#[derive(Debug, Clone)]
pub struct Generation {
    pub result: Arc<GenerationResult>,
    /// Seed that produced `result`; differs from the requested one after retries.
    pub seed: i64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub in_flight: usize,
    pub backend: WaitSnapshot,
    pub feed_subscribers: usize,
}

/// Normalized request in, post-processed images out.
///
/// Each attempt is keyed by its seeded [`CanonicalKey`](crate::models::CanonicalKey),
/// so identical concurrent requests share one backend call while retries with a
/// new seed are new work.
pub struct ImageService {
    cache: GenerationCache,
    dispatcher: ComputeDispatcher,
    postprocessor: PostProcessor,
    retry: RetryController,
    feed: FeedBroadcast,
    in_flight: InFlight,
}

impl ImageService {
    pub fn new(
        config: &Config,
        backend: Arc<dyn SynthesisBackend>,
        classifier: Arc<dyn ModerationClassifier>,
        compositor: Arc<dyn ImageCompositor>,
    ) -> Self {
        let feed = FeedBroadcast::new(config.feed_capacity);
        Self {
            cache: GenerationCache::new(&config.cache),
            dispatcher: ComputeDispatcher::new(backend, feed.clone(), config.backend.artifact_grace),
            postprocessor: PostProcessor::new(classifier, compositor, config.watermark.logo_path.clone()),
            retry: RetryController::new(config.retry.clone()),
            feed,
            in_flight: InFlight::new(),
        }
    }

    /// Wire the HTTP backend, the configured classifier and ImageMagick.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Arc::new(HttpSynthesisBackend::new(&config.backend)?);
        let classifier: Arc<dyn ModerationClassifier> = match &config.moderation.url {
            Some(url) => {
                log::info!("Moderation enabled via {}", url);
                Arc::new(HttpModerationClassifier::new(url.clone()))
            }
            None => Arc::new(NoopClassifier),
        };
        let compositor = Arc::new(ImageMagick::new(&config.watermark));
        Ok(Self::new(config, backend, classifier, compositor))
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let guard = self.in_flight.enter();
        let load = guard.load();

        let outcome = self
            .retry
            .run(&request, |attempt| self.generate_attempt(attempt, load))
            .await?;

        Ok(Generation {
            result: outcome.value,
            seed: outcome.seed,
            attempts: outcome.attempts,
        })
    }

    async fn generate_attempt(&self, request: GenerationRequest, load: usize) -> Result<Arc<GenerationResult>> {
        let key = request.canonical_key()?;
        self.cache
            .get_or_compute(key, async {
                let buffers = self.dispatcher.dispatch(&request, load).await?;
                let options = PostProcessOptions {
                    nologo: request.nologo,
                };
                let images = self.postprocessor.postprocess_all(buffers, options).await?;
                Ok(GenerationResult { images })
            })
            .await
    }

    pub fn feed(&self) -> &FeedBroadcast {
        &self.feed
    }

    pub fn postprocessor(&self) -> &PostProcessor {
        &self.postprocessor
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            in_flight: self.in_flight.current(),
            backend: self.dispatcher.metrics().snapshot(),
            feed_subscribers: self.feed.subscriber_count(),
        }
    }
}
