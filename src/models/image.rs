use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;
use crate::normalize::normalize;

/// Untrusted numeric parameters exactly as a client supplied them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParams {
    pub width: Option<String>,
    pub height: Option<String>,
    pub seed: Option<String>,
    pub model: Option<String>,
}

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: impl ToString) -> Self {
        self.width = Some(width.to_string());
        self
    }

    pub fn with_height(mut self, height: impl ToString) -> Self {
        self.height = Some(height.to_string());
        self
    }

    pub fn with_seed(mut self, seed: impl ToString) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Parameters after the normalizer has corrected them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedParams {
    pub width: u32,
    pub height: u32,
    pub seed: Option<i64>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub prompts: Vec<String>,
    pub params: NormalizedParams,
    /// Opaque to this service; forwarded to the backend as-is.
    pub priority: Option<i32>,
    pub nofeed: bool,
    pub nologo: bool,
}

impl GenerationRequest {
    pub fn new(prompts: Vec<String>, raw: &RawParams) -> Self {
        Self {
            prompts,
            params: normalize(raw),
            priority: None,
            nofeed: false,
            nologo: false,
        }
    }

    pub fn from_prompt(prompt: impl Into<String>, raw: &RawParams) -> Self {
        Self::new(vec![prompt.into()], raw)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_nologo(mut self, nologo: bool) -> Self {
        self.nologo = nologo;
        self
    }

    pub fn with_nofeed(mut self, nofeed: bool) -> Self {
        self.nofeed = nofeed;
        self
    }

    /// Copy of this request with a different seed, and therefore a different key.
    pub fn with_seed(&self, seed: i64) -> Self {
        let mut next = self.clone();
        next.params.seed = Some(seed);
        next
    }

    pub fn seed(&self) -> Option<i64> {
        self.params.seed
    }

    pub fn canonical_key(&self) -> Result<CanonicalKey> {
        let value = sort_keys(serde_json::to_value(self)?);
        Ok(CanonicalKey(serde_json::to_string(&value)?))
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Stable serialization of a normalized, seeded request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub is_mature: bool,
    pub is_child: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub metadata: ImageMetadata,
}

/// Images for one request, in prompt order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationResult {
    pub images: Vec<GeneratedImage>,
}

impl GenerationResult {
    pub fn first(&self) -> Option<&GeneratedImage> {
        self.images.first()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_work_same_key() {
        let raw = RawParams::new().with_width(640).with_height(480).with_seed(7);
        let a = GenerationRequest::from_prompt("a lighthouse", &raw);
        let b = GenerationRequest::from_prompt("a lighthouse", &raw);
        assert_eq!(a.canonical_key().unwrap(), b.canonical_key().unwrap());
    }

    #[test]
    fn test_new_seed_new_key() {
        let raw = RawParams::new().with_seed(7);
        let request = GenerationRequest::from_prompt("a lighthouse", &raw);
        let retried = request.with_seed(8);
        assert_eq!(retried.seed(), Some(8));
        assert_ne!(request.canonical_key().unwrap(), retried.canonical_key().unwrap());
    }

    #[test]
    fn test_nologo_changes_key() {
        let raw = RawParams::new().with_seed(1);
        let plain = GenerationRequest::from_prompt("x", &raw);
        let bare = plain.clone().with_nologo(true);
        assert_ne!(plain.canonical_key().unwrap(), bare.canonical_key().unwrap());
    }
}
