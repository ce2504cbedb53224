//! Backward-induction evaluator for decision trees of decision, chance and terminal nodes,
//! plus the prenatal screening model (CVS vs no test, by maternal age) that drives it.

pub mod analysis;
pub mod compute;
pub mod display;
pub mod scenario;
pub mod store;

#[cfg(feature = "python")]
pub mod bindings {
    pub mod python;
}

pub use compute::{Criterion, Engine, EvalOptions, EvaluationResult, Expected, TreeError};
pub use store::{NodeId, Registry};

#[cfg(feature = "python")]
use pyo3::prelude::*;

// --- Module Definition ---
/// This function defines the `_core` Python module.
/// The name `_core` is chosen to indicate it's an internal, compiled component.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use bindings::python;
    m.add_class::<python::PyDecisionTree>()?;
    m.add_function(wrap_pyfunction!(python::age_adjusted_risk, m)?)?;
    m.add_function(wrap_pyfunction!(python::sweep_costs, m)?)?;
    Ok(())
}
