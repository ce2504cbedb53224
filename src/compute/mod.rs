pub mod engine;
pub mod ledger;

pub use engine::{Criterion, DecisionOutcome, Engine, EvalOptions, EvaluationResult};
pub use ledger::{Expected, Ledger, TreeError};
