use super::{LduSolver, SolverInputs};
use crate::solver_performance::SolverPerformance;
use helyx_core::HelyxCoreError;

/// `psi = source / diag`, for matrices with no off-diagonal coupling.
pub struct DiagonalSolver<'a> {
    inputs: SolverInputs<'a>,
}

impl<'a> DiagonalSolver<'a> {
    pub fn new(inputs: SolverInputs<'a>) -> Self {
        Self { inputs }
    }
}

impl LduSolver for DiagonalSolver<'_> {
    fn name(&self) -> &str {
        "diagonal"
    }

    fn solve(&self, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance, HelyxCoreError> {
        let diag = self.inputs.matrix.diag();
        if psi.len() != diag.len() || source.len() != diag.len() {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "diagonal solve of {} rows given psi {} and source {}",
                diag.len(),
                psi.len(),
                source.len()
            )));
        }
        for ((p, b), d) in psi.iter_mut().zip(source).zip(diag) {
            *p = b / d;
        }
        let mut perf = SolverPerformance::new(self.name(), self.inputs.field_name);
        perf.converged = true;
        Ok(perf)
    }
}
