use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::{
    config::WatermarkConfig,
    error::{GenError, Result},
};

use super::ImageCompositor;

/// ImageMagick `convert` on the command line.
#[derive(Debug, Clone)]
pub struct ImageMagick {
    bin: String,
    offset: u32,
}

impl ImageMagick {
    pub fn new(config: &WatermarkConfig) -> Self {
        Self {
            bin: config.convert_bin.clone(),
            offset: config.offset,
        }
    }

    pub fn composite_args(&self, source: &Path, overlay: &Path, output: &Path) -> Vec<String> {
        vec![
            "-background".to_string(),
            "none".to_string(),
            "-gravity".to_string(),
            "southeast".to_string(),
            "-geometry".to_string(),
            format!("+{}+{}", self.offset, self.offset),
            source.display().to_string(),
            overlay.display().to_string(),
            "-composite".to_string(),
            output.display().to_string(),
        ]
    }

    pub fn blur_args(source: &Path, output: &Path, sigma: u32) -> Vec<String> {
        vec![
            source.display().to_string(),
            "-blur".to_string(),
            format!("0x{}", sigma),
            output.display().to_string(),
        ]
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        log::debug!("Running {} {}", self.bin, args.join(" "));

        let output = Command::new(&self.bin)
            .args(&args)
            .output()
            .await
            .map_err(|e| GenError::ToolInvocation(format!("Failed to start {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("{} exited with {}: {}", self.bin, output.status, stderr.trim());
            return Err(GenError::ToolInvocation(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageCompositor for ImageMagick {
    async fn composite(&self, source: &Path, overlay: &Path, output: &Path) -> Result<()> {
        self.run(self.composite_args(source, overlay, output)).await
    }

    async fn blur(&self, source: &Path, output: &Path, sigma: u32) -> Result<()> {
        self.run(Self::blur_args(source, output, sigma)).await
    }
}
