pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod logger;
pub mod models;
pub mod normalize;
pub mod postprocess;
pub mod retry;
#[cfg(feature = "server")]
pub mod server;
pub mod service;

pub use backend::{
    HttpModerationClassifier, HttpSynthesisBackend, ImageCompositor, ImageMagick,
    ModerationClassifier, NoopClassifier, SynthesisBackend,
};
pub use cache::{CacheStats, GenerationCache};
pub use config::{BackendConfig, CacheConfig, Config, ModerationConfig, RetryPolicy, WatermarkConfig};
pub use dispatch::{steps_for_load, ComputeDispatcher};
pub use error::{GenError, Result};
pub use feed::FeedBroadcast;
pub use models::*;
pub use normalize::normalize;
pub use postprocess::{PostProcessOptions, PostProcessor};
pub use retry::{RetryController, DEFAULT_SEED};
pub use service::{Generation, ImageService, ServiceStats};
