//! Parameter normalization.
//!
//! Every malformed value is replaced, never rejected: the caller always gets
//! parameters that fit the model's pixel budget.

use rand::Rng;

use crate::models::{ideal_side_length, NormalizedParams, RawParams, DEFAULT_MODEL};

/// Exclusive upper bound for seeds drawn to replace malformed ones.
pub const RANDOM_SEED_BOUND: i64 = 1_000_000;

pub fn normalize(raw: &RawParams) -> NormalizedParams {
    normalize_with_rng(raw, &mut rand::thread_rng())
}

pub fn normalize_with_rng<R: Rng>(raw: &RawParams, rng: &mut R) -> NormalizedParams {
    let model = raw
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string();

    let side = u64::from(ideal_side_length(&model));
    let max_pixels = side * side;

    let mut width = positive_integer(raw.width.as_deref()).unwrap_or(side);
    let mut height = positive_integer(raw.height.as_deref()).unwrap_or(side);

    let pixels = width as f64 * height as f64;
    if pixels > max_pixels as f64 {
        let ratio = (max_pixels as f64 / pixels).sqrt();
        width = ((width as f64 * ratio).floor() as u64).max(1);
        height = ((height as f64 * ratio).floor() as u64).max(1);
        // an axis floored to zero was raised to 1; trim the other one back into budget
        while width.saturating_mul(height) > max_pixels {
            if width >= height {
                width = (max_pixels / height).max(1);
            } else {
                height = (max_pixels / width).max(1);
            }
        }
    }

    let seed = match raw.seed.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<i64>()
                .unwrap_or_else(|_| rng.gen_range(0..RANDOM_SEED_BOUND)),
        ),
    };

    let params = NormalizedParams {
        width: u32::try_from(width).unwrap_or(side as u32),
        height: u32::try_from(height).unwrap_or(side as u32),
        seed,
        model,
    };
    log::debug!("Normalized {:?} to {:?}", raw, params);
    params
}

fn positive_integer(value: Option<&str>) -> Option<u64> {
    value
        .map(str::trim)
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0)
}
