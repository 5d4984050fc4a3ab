use serde::{Deserialize, Serialize};

/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "turbo";

// name, ideal side length, description
const MODEL_TABLE: &[(&str, u32, &str)] = &[
    ("turbo", 512, "Fast few-step model"),
    ("pixart", 1024, "High resolution model"),
    ("deliberate", 768, "Balanced quality model"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub ideal_side_length: u32,
    pub description: String,
}

/// All models with a dedicated entry in the side-length table.
pub fn supported_models() -> Vec<ModelInfo> {
    MODEL_TABLE
        .iter()
        .map(|(name, side, description)| ModelInfo {
            name: name.to_string(),
            ideal_side_length: *side,
            description: description.to_string(),
        })
        .collect()
}

/// Ideal side length for `model`; unknown models fall back to the default model's entry.
pub fn ideal_side_length(model: &str) -> u32 {
    let lookup = |name: &str| {
        MODEL_TABLE
            .iter()
            .find(|(candidate, _, _)| *candidate == name)
            .map(|(_, side, _)| *side)
    };
    lookup(model).or_else(|| lookup(DEFAULT_MODEL)).unwrap_or(512)
}
