//! Ratio validation
//!
//! A weight set is a complete probability partition when the ratios of its
//! active entries sum to exactly 100. Zero ratios are allowed and count as 0;
//! inactive entries are ignored entirely.

use crate::weight::ProviderWeight;
use mailroute_core::{Error, Result};

/// Sum the active ratios must reach
pub const NORMALIZED_TOTAL: u32 = 100;

/// Sum of active ratios (saturating)
pub fn active_sum(weights: &[ProviderWeight]) -> u32 {
    weights
        .iter()
        .filter(|w| w.is_active)
        .fold(0u32, |acc, w| acc.saturating_add(w.ratio))
}

/// Whether the active ratios sum to exactly 100
pub fn validate(weights: &[ProviderWeight]) -> bool {
    active_sum(weights) == NORMALIZED_TOTAL
}

/// Like [`validate`], as a `Result`
///
/// # Errors
/// - `Error::UnnormalizedWeights` carrying the actual sum
pub fn ensure_normalized(weights: &[ProviderWeight]) -> Result<()> {
    let sum = active_sum(weights);
    if sum != NORMALIZED_TOTAL {
        return Err(Error::UnnormalizedWeights(sum));
    }
    Ok(())
}
