use async_trait::async_trait;
use reqwest::{multipart, Client};
use std::time::Instant;

use crate::{
    error::{GenError, Result},
    models::{ImageMetadata, ModerationResponse},
};

use super::ModerationClassifier;

/// Flags nothing. Used until a moderation service is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopClassifier;

#[async_trait]
impl ModerationClassifier for NoopClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<ImageMetadata> {
        Ok(ImageMetadata::default())
    }
}

/// Posts the image as a multipart `file` field and reads `{nsfw, concept}`.
#[derive(Clone)]
pub struct HttpModerationClassifier {
    client: Client,
    url: String,
}

impl HttpModerationClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ModerationClassifier for HttpModerationClassifier {
    async fn classify(&self, image: &[u8]) -> Result<ImageMetadata> {
        let part = multipart::Part::bytes(image.to_vec()).file_name("image.jpg");
        let form = multipart::Form::new().part("file", part);

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenError::Network(format!("Moderation request failed: {}", e)))?;
        log::debug!("Moderation check took {}ms", started.elapsed().as_millis());

        let status = response.status();
        if !status.is_success() {
            return Err(GenError::Backend {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let verdict: ModerationResponse = response
            .json()
            .await
            .map_err(|e| GenError::Serialization(format!("Invalid moderation response: {}", e)))?;

        Ok(ImageMetadata {
            is_mature: verdict.nsfw,
            is_child: verdict.flags_child(),
        })
    }
}
