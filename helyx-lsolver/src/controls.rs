use helyx_core::{Dictionary, HelyxCoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Linear solver settings for one field, read from the `solvers`
/// sub-dictionary of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverControls {
    pub solver: String,
    pub preconditioner: String,
    pub smoother: String,
    pub tolerance: f64,
    pub rel_tol: f64,
    pub max_iter: usize,
    pub min_iter: usize,
    pub n_sweeps: usize,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            solver: "PBiCGStab".to_string(),
            preconditioner: "none".to_string(),
            smoother: "GaussSeidel".to_string(),
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iter: 1000,
            min_iter: 0,
            n_sweeps: 1,
        }
    }
}

impl SolverControls {
    pub fn new(solver: impl Into<String>) -> Self {
        Self {
            solver: solver.into(),
            ..Default::default()
        }
    }

    pub fn with_preconditioner(mut self, preconditioner: impl Into<String>) -> Self {
        self.preconditioner = preconditioner.into();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64, rel_tol: f64) -> Self {
        self.tolerance = tolerance;
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Reads the controls; `solver` is mandatory, every other entry has a
    /// default.
    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, HelyxCoreError> {
        if !dict.found("solver") {
            return Err(HelyxCoreError::Dictionary(format!(
                "keyword solver is undefined in dictionary {}",
                dict.name()
            )));
        }
        serde_json::from_value(Value::Object(dict.entries().clone())).map_err(|e| {
            HelyxCoreError::Dictionary(format!("bad solver controls in {}: {}", dict.name(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_dictionary_uses_case_spellings() {
        let dict = Dictionary::from_value(
            "solvers/p",
            json!({ "solver": "PCG", "preconditioner": "DIC", "relTol": 0.01, "maxIter": 50 }),
        )
        .unwrap();
        let controls = SolverControls::from_dictionary(&dict).unwrap();
        assert_eq!(controls.solver, "PCG");
        assert_eq!(controls.preconditioner, "DIC");
        assert_eq!(controls.rel_tol, 0.01);
        assert_eq!(controls.max_iter, 50);
        assert_eq!(controls.tolerance, 1e-6);
        assert_eq!(controls.n_sweeps, 1);
    }

    #[test]
    fn test_solver_keyword_is_mandatory() {
        let dict = Dictionary::from_value("solvers/T", json!({ "tolerance": 1e-8 })).unwrap();
        assert!(matches!(
            SolverControls::from_dictionary(&dict),
            Err(HelyxCoreError::Dictionary(_))
        ));
    }
}
