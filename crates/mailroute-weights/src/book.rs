//! Administrative weight book
//!
//! Holds the provider weights an administrator edits and rejects invalid
//! writes synchronously, instead of letting them surface later during a
//! simulation or a dispatch.
//!
//! Write rules:
//! - every ratio must be within 0..=100
//! - active ratios may never exceed 100
//! - once active ratios sum to exactly 100, single-entry edits that move the
//!   sum away from 100 are refused; use [`WeightBook::replace_all`] to
//!   rebalance several entries at once
//!
//! Entries are deactivated rather than deleted so historical simulation runs
//! keep referring to a known provider.

use crate::{
    simulation::{SimulationRun, simulate},
    validator::{NORMALIZED_TOTAL, active_sum, ensure_normalized, validate},
    weight::ProviderWeight,
};
use mailroute_core::{Error, Result};

/// Provider weights in insertion order, keyed by name
#[derive(Debug, Clone, Default)]
pub struct WeightBook {
    entries: Vec<ProviderWeight>,
}

impl WeightBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a complete, normalized weight set
    ///
    /// # Errors
    /// Same as [`WeightBook::replace_all`].
    pub fn from_weights(weights: Vec<ProviderWeight>) -> Result<Self> {
        let mut book = Self::new();
        book.replace_all(weights)?;
        Ok(book)
    }

    pub fn weights(&self) -> &[ProviderWeight] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ProviderWeight> {
        self.entries.iter().find(|w| w.name == name)
    }

    pub fn active(&self) -> impl Iterator<Item = &ProviderWeight> {
        self.entries.iter().filter(|w| w.is_active)
    }

    /// Whether the active ratios currently sum to 100
    pub fn is_valid(&self) -> bool {
        validate(&self.entries)
    }

    /// Create or update one entry
    ///
    /// # Errors
    /// - `Error::InvalidRatio` if the ratio is outside 0..=100
    /// - `Error::WeightOverAllocated` if active ratios would exceed 100
    /// - `Error::WeightRebalanceRequired` if a normalized book would stop being normalized
    pub fn upsert(&mut self, weight: ProviderWeight) -> Result<()> {
        weight.check_range()?;

        let mut candidate = self.entries.clone();
        match candidate.iter_mut().find(|w| w.name == weight.name) {
            Some(existing) => *existing = weight.clone(),
            None => candidate.push(weight.clone()),
        }

        self.commit(candidate)?;
        tracing::info!(
            provider = %weight.name,
            ratio = weight.ratio,
            active = weight.is_active,
            "Provider weight saved"
        );
        Ok(())
    }

    /// Activate or deactivate one entry
    ///
    /// # Errors
    /// - `Error::WeightNotFound` if no entry has this name
    /// - `Error::WeightOverAllocated` / `Error::WeightRebalanceRequired` as for [`WeightBook::upsert`]
    pub fn set_active(&mut self, name: &str, is_active: bool) -> Result<()> {
        let mut candidate = self.entries.clone();
        let entry = candidate
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or_else(|| Error::WeightNotFound(name.to_string()))?;
        entry.is_active = is_active;

        self.commit(candidate)?;
        tracing::info!(provider = name, active = is_active, "Provider weight toggled");
        Ok(())
    }

    /// Atomically swap the whole book for a normalized set
    ///
    /// # Errors
    /// - `Error::InvalidRatio` if any ratio is outside 0..=100
    /// - `Error::Config` if two entries share a name
    /// - `Error::UnnormalizedWeights` if active ratios do not sum to 100
    pub fn replace_all(&mut self, weights: Vec<ProviderWeight>) -> Result<()> {
        for (i, weight) in weights.iter().enumerate() {
            weight.check_range()?;
            if weights[..i].iter().any(|w| w.name == weight.name) {
                return Err(Error::Config(format!(
                    "duplicate provider weight '{}'",
                    weight.name
                )));
            }
        }
        ensure_normalized(&weights)?;

        self.entries = weights;
        tracing::info!(providers = self.entries.len(), "Provider weights replaced");
        Ok(())
    }

    /// Simulate a batch against the current book
    ///
    /// # Errors
    /// - `Error::UnnormalizedWeights` if the book is not normalized
    pub fn simulate(&self, total_requests: u64) -> Result<SimulationRun> {
        simulate(&self.entries, total_requests)
    }

    fn commit(&mut self, candidate: Vec<ProviderWeight>) -> Result<()> {
        let before = active_sum(&self.entries);
        let after = active_sum(&candidate);

        if after > NORMALIZED_TOTAL {
            return Err(Error::WeightOverAllocated(after));
        }
        if before == NORMALIZED_TOTAL && after != NORMALIZED_TOTAL {
            return Err(Error::WeightRebalanceRequired(after));
        }

        self.entries = candidate;
        Ok(())
    }
}
