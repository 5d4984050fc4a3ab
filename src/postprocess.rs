//! Moderation gate and watermark compositing.
//!
//! Scratch files live in a `ScratchPair` of `tempfile` paths; whichever way a
//! call returns, dropping the pair removes both files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, TempPath};

use crate::{
    backend::{ImageCompositor, ModerationClassifier},
    error::{GenError, Result},
    logger::timer,
    models::GeneratedImage,
};

/// Blur strength used when callers have no preference.
pub const DEFAULT_BLUR_SIGMA: u32 = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcessOptions {
    pub nologo: bool,
}

struct ScratchPair {
    input: TempPath,
    output: TempPath,
}

impl ScratchPair {
    async fn with_input(buffer: &[u8]) -> Result<Self> {
        let pair = Self {
            input: scratch_file(".png")?,
            output: scratch_file(".jpg")?,
        };
        tokio::fs::write(pair.input(), buffer).await?;
        Ok(pair)
    }

    fn input(&self) -> &Path {
        &self.input
    }

    fn output(&self) -> &Path {
        &self.output
    }

    /// Read the tool's output, then remove both files.
    async fn into_output(self) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(self.output()).await?;
        if bytes.is_empty() {
            return Err(GenError::ToolInvocation(
                "Image tool produced no output".to_string(),
            ));
        }
        for path in [self.input, self.output] {
            let display = path.display().to_string();
            if let Err(e) = path.close() {
                log::warn!("Failed to remove scratch file {}: {}", display, e);
            }
        }
        Ok(bytes)
    }
}

fn scratch_file(suffix: &str) -> Result<TempPath> {
    let file = Builder::new().prefix("rgen-").suffix(suffix).tempfile()?;
    Ok(file.into_temp_path())
}

pub struct PostProcessor {
    classifier: Arc<dyn ModerationClassifier>,
    compositor: Arc<dyn ImageCompositor>,
    logo: PathBuf,
}

impl PostProcessor {
    pub fn new(
        classifier: Arc<dyn ModerationClassifier>,
        compositor: Arc<dyn ImageCompositor>,
        logo: impl Into<PathBuf>,
    ) -> Self {
        Self {
            classifier,
            compositor,
            logo: logo.into(),
        }
    }

    pub async fn postprocess(&self, buffer: Vec<u8>, options: PostProcessOptions) -> Result<GeneratedImage> {
        let metadata = self.classifier.classify(&buffer).await?;
        log::debug!(
            "Moderation: mature={} child={}",
            metadata.is_mature,
            metadata.is_child
        );

        let bytes = if options.nologo || metadata.is_mature {
            buffer
        } else {
            self.watermark(&buffer).await?
        };

        Ok(GeneratedImage { bytes, metadata })
    }

    /// Post-process every buffer of a batch concurrently, keeping order.
    pub async fn postprocess_all(
        &self,
        buffers: Vec<Vec<u8>>,
        options: PostProcessOptions,
    ) -> Result<Vec<GeneratedImage>> {
        futures::future::try_join_all(
            buffers
                .into_iter()
                .map(|buffer| self.postprocess(buffer, options)),
        )
        .await
    }

    pub async fn watermark(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        let scratch = ScratchPair::with_input(buffer).await?;
        let _timer = timer("watermark composite");
        self.compositor
            .composite(scratch.input(), &self.logo, scratch.output())
            .await?;
        scratch.into_output().await
    }

    pub async fn blur(&self, buffer: &[u8], sigma: u32) -> Result<Vec<u8>> {
        let scratch = ScratchPair::with_input(buffer).await?;
        self.compositor
            .blur(scratch.input(), scratch.output(), sigma)
            .await?;
        scratch.into_output().await
    }
}

impl std::fmt::Debug for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessor").field("logo", &self.logo).finish()
    }
}
