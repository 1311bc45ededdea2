//! Rule-based behavioural scoring
//!
//! - [`BehaviorProfile`] - per-user transaction history
//! - [`ProfileStore`] - sharded, bounded profile map
//! - [`BehavioralScorer`] - rules evaluated against a profile

mod profile;
mod scorer;
mod store;

pub use profile::{BehaviorProfile, RECENT_RISK_CAPACITY};
pub use scorer::{BehaviorAssessment, BehaviorRules, BehavioralScorer};
pub use store::{ProfileStore, ProfileStoreConfig, ProfileStoreStats};
