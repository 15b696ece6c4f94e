//! MailRoute provider weights
//!
//! Tools for gaining confidence in a weight configuration before it carries
//! production traffic:
//! - Provider weight records and the administrative weight book
//! - Ratio validation (active ratios must sum to exactly 100)
//! - Distribution simulation and a ledger of past runs
//! - Expansion of a weight set into a routing policy option list

pub mod book;
pub mod options;
pub mod simulation;
pub mod validator;
pub mod weight;

pub use book::WeightBook;
pub use options::{projected_distribution, selection_distribution, to_weighted_option};
pub use simulation::{SimulatedCount, SimulationLedger, SimulationRun, simulate};
pub use validator::{NORMALIZED_TOTAL, active_sum, ensure_normalized, validate};
pub use weight::ProviderWeight;
