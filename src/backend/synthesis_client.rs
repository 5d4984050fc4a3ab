use async_trait::async_trait;
use reqwest::Client;

use crate::{
    config::BackendConfig,
    error::{GenError, Result},
    models::{PredictOutput, PredictPayload},
};

use super::SynthesisBackend;

#[derive(Clone)]
pub struct HttpSynthesisBackend {
    client: Client,
    url: String,
}

impl HttpSynthesisBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GenError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesisBackend {
    async fn predict(&self, payload: &PredictPayload) -> Result<Vec<PredictOutput>> {
        log::debug!("Calling backend {} with prompts {:?}", self.url, payload.prompts);

        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| GenError::Network(format!("Backend request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::error!("Backend responded with {}: {}", status, message);
            return Err(GenError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Vec<PredictOutput>>()
            .await
            .map_err(|e| GenError::InvalidOutput(format!("Malformed backend response: {}", e)))
    }
}
