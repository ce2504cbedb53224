//! The prenatal screening model that drives the evaluator: risk, tree construction, age sweeps.
pub mod error;
pub mod prenatal;
pub mod risk;
pub mod sweep;

pub use error::ScenarioError;
pub use prenatal::{build_registry, PrenatalParams, PrenatalTree};
pub use risk::age_adjusted_risk;
pub use sweep::{sweep, SweepPoint, DEFAULT_AGES};
