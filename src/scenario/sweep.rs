//! Expected strategy costs over a range of maternal ages.
use crate::compute::Expected;
use crate::scenario::error::ScenarioError;
use crate::scenario::prenatal::{PrenatalParams, PrenatalTree, DIAGNOSTIC_TEST, NO_DIAGNOSTIC_TEST};
use crate::store::NodeId;
use crate::compute::TreeError;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use std::ops::RangeInclusive;
use tracing::{info, instrument};

/// Ages covered by the published cost curve.
pub const DEFAULT_AGES: RangeInclusive<u32> = 16..=55;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub age: u32,
    pub risk: f64,
    pub diagnostic: Expected,
    pub no_diagnostic: Expected,
}

/// Builds and rolls back one tree per age. Trees share nothing, so ages run in parallel;
/// the result is in ascending age order.
#[instrument(level = "info", skip(params))]
pub fn sweep(ages: RangeInclusive<u32>, params: &PrenatalParams) -> Result<Vec<SweepPoint>, ScenarioError> {
    if ages.is_empty() {
        return Err(ScenarioError::EmptyAgeRange { from: *ages.start(), to: *ages.end() });
    }
    params.validate()?;

    let points = ages
        .into_par_iter()
        .map(|age| evaluate_age(age, params))
        .collect::<Result<Vec<_>, TreeError>>()?;

    info!(points = points.len(), "age sweep complete");
    Ok(points)
}

fn evaluate_age(age: u32, params: &PrenatalParams) -> Result<SweepPoint, TreeError> {
    let tree = PrenatalTree::for_age(age as f64, params);
    let result = tree.evaluate()?;
    let branch = |label: &str| {
        result.branch(label).ok_or_else(|| TreeError::UnknownNode { id: NodeId::from(label) })
    };
    Ok(SweepPoint {
        age,
        risk: tree.risk(),
        diagnostic: branch(DIAGNOSTIC_TEST)?,
        no_diagnostic: branch(NO_DIAGNOSTIC_TEST)?,
    })
}
