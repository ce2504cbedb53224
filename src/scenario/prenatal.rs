//! The CVS screening tree: "Diagnostic Test" vs "No Diagnostic Test" for one maternal age.
use crate::compute::{Engine, EvalOptions, EvaluationResult, TreeError};
use crate::scenario::error::ScenarioError;
use crate::scenario::risk::age_adjusted_risk;
use crate::store::Registry;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const ROOT: &str = "d1";
pub const DIAGNOSTIC_TEST: &str = "Diagnostic Test";
pub const NO_DIAGNOSTIC_TEST: &str = "No Diagnostic Test";

/// Clinical probabilities and outcome costs (USD) of the screening model.
///
/// Passed explicitly into tree construction; nothing here is global.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrenatalParams {
    /// Procedure-related miscarriage after CVS.
    pub prm: f64,
    /// Spontaneous fetal loss of a Trisomy 21 pregnancy.
    pub sfl: f64,
    /// Termination after a positive CVS diagnosis.
    pub top: f64,
    /// Unaffected live birth.
    pub ulb_cost: f64,
    /// Trisomy 21 live birth.
    pub tlb_cost: f64,
    pub sfl_cost: f64,
    pub prm_cost: f64,
    pub top_cost: f64,
    /// Chorionic villus sampling.
    pub cvs_cost: f64,
}

impl Default for PrenatalParams {
    fn default() -> Self {
        Self {
            prm: 0.0022,
            sfl: 0.43,
            top: 0.8,
            ulb_cost: 0.0,
            tlb_cost: 427_577.0,
            sfl_cost: 0.0,
            prm_cost: 0.0,
            top_cost: 581.0,
            cvs_cost: 1_010.0,
        }
    }
}

impl PrenatalParams {
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Reads a (possibly partial) JSON object; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|source| ScenarioError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        for (name, value) in [("prm", self.prm), ("sfl", self.sfl), ("top", self.top)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScenarioError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

/// Builds the screening tree with Trisomy 21 probability `risk`.
pub fn build_registry(risk: f64, params: &PrenatalParams) -> Registry {
    let p = params;
    let mut reg = Registry::new();
    reg.insert_decision(ROOT, 0.0, 0.0, [DIAGNOSTIC_TEST, NO_DIAGNOSTIC_TEST])
        .insert_chance(DIAGNOSTIC_TEST, p.cvs_cost, 0.0, ["c3", "c4"], vec![risk, 1.0 - risk])
        .insert_chance(NO_DIAGNOSTIC_TEST, 0.0, 0.0, ["c5", "t9"], vec![risk, 1.0 - risk])
        // Affected pregnancy, tested
        .insert_chance("c3", 0.0, 0.0, ["c6", "t4"], vec![1.0 - p.prm, p.prm])
        // Unaffected pregnancy, tested
        .insert_chance("c4", 0.0, 0.0, ["t5", "t6"], vec![1.0 - p.prm, p.prm])
        // Affected pregnancy, untested
        .insert_chance("c5", 0.0, 0.0, ["t7", "t8"], vec![p.sfl, 1.0 - p.sfl])
        .insert_chance("c6", 0.0, 0.0, ["t1", "c7"], vec![p.top, 1.0 - p.top])
        .insert_chance("c7", 0.0, 0.0, ["t2", "t3"], vec![p.sfl, 1.0 - p.sfl])
        .insert_terminal("t1", p.top_cost, 0.0)
        .insert_terminal("t2", p.sfl_cost, 0.0)
        .insert_terminal("t3", p.tlb_cost, 0.0)
        .insert_terminal("t4", p.prm_cost, 0.0)
        .insert_terminal("t5", p.ulb_cost, 0.0)
        .insert_terminal("t6", p.prm_cost, 0.0)
        .insert_terminal("t7", p.sfl_cost, 0.0)
        .insert_terminal("t8", p.tlb_cost, 0.0)
        .insert_terminal("t9", p.ulb_cost, 0.0);
    reg
}

/// One screening tree, built for a single maternal age (or an explicit risk).
#[derive(Debug, Clone)]
pub struct PrenatalTree {
    risk: f64,
    registry: Registry,
}

impl PrenatalTree {
    pub fn for_age(age: f64, params: &PrenatalParams) -> Self {
        Self::with_risk(age_adjusted_risk(age), params)
    }

    pub fn with_risk(risk: f64, params: &PrenatalParams) -> Self {
        Self { risk, registry: build_registry(risk, params) }
    }

    pub fn risk(&self) -> f64 { self.risk }
    pub fn registry(&self) -> &Registry { &self.registry }

    pub fn evaluate(&self) -> Result<EvaluationResult, TreeError> {
        Engine::with_options(&self.registry, EvalOptions::default()).evaluate(ROOT)
    }

    /// Expected cost per top-level strategy.
    pub fn costs(&self) -> Result<BTreeMap<String, f64>, TreeError> {
        let result = self.evaluate()?;
        Ok(result.branch_map().into_iter().map(|(id, e)| (id.0, e.cost)).collect())
    }
}
