use crate::analysis::Validator;
use crate::compute::{Criterion, Engine, EvalOptions};
use crate::display::trace;
use crate::scenario::{self, PrenatalParams};
use crate::store::Registry;
use pyo3::prelude::*;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use std::collections::HashMap;

#[pyclass(name = "_DecisionTree")]
#[derive(Debug, Clone, Default)]
pub struct PyDecisionTree {
    registry: Registry,
}

#[pymethods]
impl PyDecisionTree {
    #[new]
    pub fn new() -> Self { Self::default() }

    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<Self> {
        Registry::from_json_str(json)
            .map(|registry| Self { registry })
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    pub fn to_json(&self) -> PyResult<String> {
        self.registry.to_json().map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    pub fn add_decision(&mut self, id: String, cost: f64, utility: f64, children: Vec<String>) {
        self.registry.insert_decision(id, cost, utility, children);
    }

    pub fn add_chance(&mut self, id: String, cost: f64, utility: f64, children: Vec<String>, probabilities: Vec<f64>) {
        self.registry.insert_chance(id, cost, utility, children, probabilities);
    }

    pub fn add_terminal(&mut self, id: String, cost: f64, utility: f64) {
        self.registry.insert_terminal(id, cost, utility);
    }

    /// Branch label -> (cost, utility) for every decision node under `root`.
    #[pyo3(signature = (root, maximize_utility = false))]
    pub fn evaluate(&self, root: &str, maximize_utility: bool) -> PyResult<HashMap<String, (f64, f64)>> {
        let options = EvalOptions {
            criterion: if maximize_utility { Criterion::MaxUtility } else { Criterion::MinCost },
            ..Default::default()
        };
        let result = Engine::with_options(&self.registry, options)
            .evaluate(root)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(result.branch_map().into_iter().map(|(id, e)| (id.0, e.into())).collect())
    }

    pub fn validate(&self, root: &str) -> PyResult<()> {
        Validator::new(&self.registry).validate(root).map_err(|errs| {
            let msg = errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n");
            PyValueError::new_err(msg)
        })
    }

    pub fn trace(&self, root: &str) -> PyResult<String> {
        let result = Engine::new(&self.registry)
            .evaluate(root)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(trace::format_trace(&self.registry, &result))
    }

    pub fn node_count(&self) -> usize { self.registry.count() }
}

#[pyfunction]
pub fn age_adjusted_risk(age: f64) -> f64 {
    scenario::age_adjusted_risk(age)
}

/// (age, risk, diagnostic cost, no-diagnostic cost) for every age in `start..=end`.
#[pyfunction]
#[pyo3(signature = (start = 16, end = 55))]
pub fn sweep_costs(start: u32, end: u32) -> PyResult<Vec<(u32, f64, f64, f64)>> {
    let points = scenario::sweep(start..=end, &PrenatalParams::default())
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(points.into_iter().map(|p| (p.age, p.risk, p.diagnostic.cost, p.no_diagnostic.cost)).collect())
}
