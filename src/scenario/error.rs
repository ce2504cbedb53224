use crate::compute::ledger::TreeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Parameter '{name}' = {value} must lie in [0, 1]")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("Empty age range {from}..={to}")]
    EmptyAgeRange { from: u32, to: u32 },
    #[error(transparent)]
    Tree(#[from] TreeError),
}
