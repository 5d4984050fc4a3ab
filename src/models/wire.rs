use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Height sent to the backend when nothing overrides it.
pub const DEFAULT_BACKEND_HEIGHT: u32 = 384;

/// JSON body of a backend `predict` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictPayload {
    pub prompts: Vec<String>,
    pub steps: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl PredictPayload {
    pub fn new(prompts: Vec<String>, steps: u32) -> Self {
        Self {
            prompts,
            steps,
            height: DEFAULT_BACKEND_HEIGHT,
            width: None,
            seed: None,
            model: None,
            priority: None,
        }
    }
}

/// One entry of a successful `predict` response, one per prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictOutput {
    pub output_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConcept {
    #[serde(default)]
    pub special_scores: HashMap<String, f64>,
}

/// Response of the moderation `check` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResponse {
    pub nsfw: bool,
    #[serde(default)]
    pub concept: Option<ModerationConcept>,
}

impl ModerationResponse {
    /// True when any special-concept score fired.
    pub fn flags_child(&self) -> bool {
        self.concept
            .as_ref()
            .map_or(false, |c| c.special_scores.values().any(|score| *score > 0.0))
    }
}
