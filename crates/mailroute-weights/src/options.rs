//! Weight set to routing policy conversion
//!
//! Bridges the validator and the dispatcher: a normalized weight set is
//! expanded into the repetition-encoded option list a routing policy holds,
//! and the selector's actual split over a key range can be measured against
//! the configured ratios.

use crate::{simulation::SimulatedCount, validator::ensure_normalized, weight::ProviderWeight};
use mailroute_core::{Result, WeightedOption};
use mailroute_routing::select;
use std::ops::Range;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Expand a normalized weight set into a weighted option list
///
/// Each active provider with a non-zero ratio appears `ratio / g` times,
/// where `g` is the greatest common divisor of those ratios, so `70/30`
/// becomes seven slots and three slots.
///
/// # Errors
/// - `Error::UnnormalizedWeights` if the active ratios do not sum to 100
pub fn to_weighted_option(weights: &[ProviderWeight]) -> Result<WeightedOption> {
    ensure_normalized(weights)?;

    let carrying: Vec<&ProviderWeight> = weights
        .iter()
        .filter(|w| w.is_active && w.ratio > 0)
        .collect();
    let divisor = carrying.iter().fold(0, |acc, w| gcd(acc, w.ratio)).max(1);

    let mut options = Vec::new();
    for weight in carrying {
        let slots = (weight.ratio / divisor) as usize;
        options.extend(std::iter::repeat_n(weight.name.clone(), slots));
    }

    Ok(WeightedOption::new(options))
}

/// Count how the selector spreads `keys` over `options`
///
/// Counts are listed per distinct backend in first-appearance order.
///
/// # Errors
/// - `Error::EmptyPolicy` if `options` is empty
pub fn selection_distribution(
    options: &WeightedOption,
    keys: Range<i64>,
) -> Result<Vec<SimulatedCount>> {
    let mut counts: Vec<SimulatedCount> = options
        .distinct()
        .into_iter()
        .map(|name| SimulatedCount {
            backend_name: name.to_string(),
            sent_count: 0,
        })
        .collect();

    for key in keys {
        let chosen = select(options, key)?;
        if let Some(entry) = counts.iter_mut().find(|c| c.backend_name == chosen) {
            entry.sent_count += 1;
        }
    }

    Ok(counts)
}

/// Selector split over keys `0..total` without visiting every key
///
/// Selection repeats every `options.len()` keys, so one full cycle is counted
/// and scaled, then the trailing partial cycle is added. The result equals
/// [`selection_distribution`] over `0..total`.
///
/// # Errors
/// - `Error::EmptyPolicy` if `options` is empty and `total > 0`
pub fn projected_distribution(options: &WeightedOption, total: u64) -> Result<Vec<SimulatedCount>> {
    if total == 0 {
        return selection_distribution(options, 0..0);
    }
    select(options, 0)?;

    let period = u64::try_from(options.len()).unwrap_or(u64::MAX);
    let cycles = total / period;
    let rest = total % period;

    let cycle = selection_distribution(options, 0..key_bound(period))?;
    let tail = selection_distribution(options, 0..key_bound(rest))?;

    Ok(cycle
        .into_iter()
        .zip(tail)
        .map(|(full, partial)| SimulatedCount {
            backend_name: full.backend_name,
            sent_count: full.sent_count * cycles + partial.sent_count,
        })
        .collect())
}

fn key_bound(keys: u64) -> i64 {
    i64::try_from(keys).unwrap_or(i64::MAX)
}
