pub mod compositor;
pub mod moderation_client;
pub mod synthesis_client;

use async_trait::async_trait;
use std::path::Path;

use crate::{
    error::Result,
    models::{ImageMetadata, PredictOutput, PredictPayload},
};

pub use compositor::ImageMagick;
pub use moderation_client::{HttpModerationClassifier, NoopClassifier};
pub use synthesis_client::HttpSynthesisBackend;

/// The remote image-synthesis service.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// One `predict` call. Any non-success status is a `GenError::Backend`.
    async fn predict(&self, payload: &PredictPayload) -> Result<Vec<PredictOutput>>;
}

/// Content classification for a generated image.
#[async_trait]
pub trait ModerationClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<ImageMetadata>;
}

/// External image tool used for watermarking and blurring.
#[async_trait]
pub trait ImageCompositor: Send + Sync {
    /// Overlay `overlay` onto the bottom-right corner of `source`, writing `output`.
    async fn composite(&self, source: &Path, overlay: &Path, output: &Path) -> Result<()>;

    async fn blur(&self, source: &Path, output: &Path, sigma: u32) -> Result<()>;
}
