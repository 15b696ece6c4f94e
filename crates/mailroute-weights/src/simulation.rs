//! Distribution simulation
//!
//! Computes how a batch of sends would be split across providers under a
//! weight set, so an operator can inspect the split before activating it.
//!
//! ```rust
//! use mailroute_weights::{ProviderWeight, simulate};
//!
//! let weights = vec![ProviderWeight::new("A", 70), ProviderWeight::new("B", 30)];
//! let run = simulate(&weights, 3).unwrap();
//!
//! assert_eq!(run.count_for("A"), Some(2));
//! assert_eq!(run.count_for("B"), Some(0));
//! // Floor division drops the remainder; it is reported, not redistributed
//! assert_eq!(run.unallocated(), 1);
//! ```

use crate::{validator::ensure_normalized, weight::ProviderWeight};
use chrono::{DateTime, Utc};
use mailroute_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Simulated send count for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedCount {
    pub backend_name: String,
    pub sent_count: u64,
}

/// Result of one simulation, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub total_requests: u64,
    /// One entry per active weight, in input order
    pub results: Vec<SimulatedCount>,
}

impl SimulationRun {
    /// Sum of simulated counts
    pub fn allocated(&self) -> u64 {
        self.results.iter().map(|r| r.sent_count).sum()
    }

    /// Requests lost to floor division
    pub fn unallocated(&self) -> u64 {
        self.total_requests.saturating_sub(self.allocated())
    }

    /// Simulated count for a provider, if it took part in the run
    pub fn count_for(&self, backend_name: &str) -> Option<u64> {
        self.results
            .iter()
            .find(|r| r.backend_name == backend_name)
            .map(|r| r.sent_count)
    }
}

/// `floor(total * ratio / 100)` without overflowing
fn share(total: u64, ratio: u32) -> u64 {
    let ratio = u64::from(ratio);
    (total / 100) * ratio + (total % 100) * ratio / 100
}

/// Simulate `total_requests` sends over the active entries of `weights`
///
/// # Errors
/// - `Error::UnnormalizedWeights` if the active ratios do not sum to 100
pub fn simulate(weights: &[ProviderWeight], total_requests: u64) -> Result<SimulationRun> {
    ensure_normalized(weights)?;

    let results = weights
        .iter()
        .filter(|w| w.is_active)
        .map(|w| SimulatedCount {
            backend_name: w.name.clone(),
            sent_count: share(total_requests, w.ratio),
        })
        .collect();

    let run = SimulationRun {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        total_requests,
        results,
    };

    if run.unallocated() > 0 {
        tracing::warn!(
            run = %run.id,
            total_requests,
            unallocated = run.unallocated(),
            "Simulation left requests unallocated after floor division"
        );
    }

    Ok(run)
}

/// Keeps every simulation run produced through it
#[derive(Debug, Default)]
pub struct SimulationLedger {
    runs: Mutex<Vec<SimulationRun>>,
}

impl SimulationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate and record the run
    ///
    /// # Errors
    /// - `Error::UnnormalizedWeights`; nothing is recorded
    pub fn run(&self, weights: &[ProviderWeight], total_requests: u64) -> Result<SimulationRun> {
        let run = simulate(weights, total_requests)?;
        self.record(run.clone());

        tracing::info!(
            run = %run.id,
            total_requests,
            providers = run.results.len(),
            "Simulation recorded"
        );
        Ok(run)
    }

    /// Store an already produced run
    pub fn record(&self, run: SimulationRun) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run);
    }

    /// Most recent run by creation time; later insertion wins ties
    pub fn latest(&self) -> Option<SimulationRun> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.iter().max_by_key(|run| run.created_at).cloned()
    }

    pub fn get(&self, id: Uuid) -> Option<SimulationRun> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.iter().find(|run| run.id == id).cloned()
    }

    /// Every run in insertion order
    pub fn list(&self) -> Vec<SimulationRun> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroute_core::Error;

    fn a70_b30() -> Vec<ProviderWeight> {
        vec![ProviderWeight::new("A", 70), ProviderWeight::new("B", 30)]
    }

    fn counts(run: &SimulationRun) -> Vec<(&str, u64)> {
        run.results
            .iter()
            .map(|r| (r.backend_name.as_str(), r.sent_count))
            .collect()
    }

    #[test]
    fn test_exact_split() {
        let run = simulate(&a70_b30(), 100).unwrap();
        assert_eq!(counts(&run), vec![("A", 70), ("B", 30)]);
        assert_eq!(run.unallocated(), 0);

        let run = simulate(&a70_b30(), 10).unwrap();
        assert_eq!(counts(&run), vec![("A", 7), ("B", 3)]);
        assert_eq!(run.unallocated(), 0);
    }

    #[test]
    fn test_floor_truncation_is_surfaced() {
        let run = simulate(&a70_b30(), 3).unwrap();
        assert_eq!(counts(&run), vec![("A", 2), ("B", 0)]);
        assert_eq!(run.allocated(), 2);
        assert_eq!(run.unallocated(), 1);
    }

    #[test]
    fn test_zero_requests() {
        let run = simulate(&a70_b30(), 0).unwrap();
        assert_eq!(counts(&run), vec![("A", 0), ("B", 0)]);
        assert_eq!(run.unallocated(), 0);
    }

    #[test]
    fn test_order_follows_input_and_skips_inactive() {
        let weights = vec![
            ProviderWeight::new("mailgun", 25),
            ProviderWeight::inactive("legacy", 40),
            ProviderWeight::new("sendgrid", 75),
            ProviderWeight::new("directSend", 0),
        ];
        let run = simulate(&weights, 1000).unwrap();
        assert_eq!(
            counts(&run),
            vec![("mailgun", 250), ("sendgrid", 750), ("directSend", 0)]
        );
        assert_eq!(run.count_for("legacy"), None);
    }

    #[test]
    fn test_unnormalized_refused() {
        let weights = vec![ProviderWeight::new("A", 70), ProviderWeight::new("B", 20)];
        assert!(matches!(
            simulate(&weights, 100),
            Err(Error::UnnormalizedWeights(90))
        ));
        assert!(matches!(
            simulate(&[], 100),
            Err(Error::UnnormalizedWeights(0))
        ));
    }

    #[test]
    fn test_large_totals_do_not_overflow() {
        let run = simulate(&a70_b30(), u64::MAX).unwrap();
        assert_eq!(run.count_for("A"), Some(u64::MAX / 100 * 70 + (u64::MAX % 100) * 70 / 100));
        assert_eq!(run.unallocated(), 1);
    }

    #[test]
    fn test_repeated_runs_are_reproducible() {
        let first = simulate(&a70_b30(), 37).unwrap();
        let second = simulate(&a70_b30(), 37).unwrap();
        assert_eq!(first.results, second.results);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_ledger_latest() {
        let ledger = SimulationLedger::new();
        assert!(ledger.latest().is_none());

        let first = ledger.run(&a70_b30(), 100).unwrap();
        let second = ledger.run(&a70_b30(), 10).unwrap();

        let latest = ledger.latest().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(ledger.get(first.id).unwrap().total_requests, 100);
        assert_eq!(ledger.list().len(), 2);
    }

    #[test]
    fn test_ledger_rejects_unnormalized_without_recording() {
        let ledger = SimulationLedger::new();
        let bad = vec![ProviderWeight::new("A", 10)];
        assert!(ledger.run(&bad, 100).is_err());
        assert!(ledger.list().is_empty());
    }

    #[test]
    fn test_run_serializes() {
        let run = simulate(&a70_b30(), 100).unwrap();
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["total_requests"], 100);
        assert_eq!(json["results"][0]["backend_name"], "A");
        assert_eq!(json["results"][0]["sent_count"], 70);
    }
}
