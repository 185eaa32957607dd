use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Small number added to normalisation factors and used to detect a
/// vanishing relative tolerance.
pub const SMALL: f64 = 1e-20;

/// Very small number below which a reduction is treated as singular.
pub const VSMALL: f64 = 1e-300;

/// Outcome of one linear solve.
///
/// A solve that does not reach its tolerance still returns a performance
/// record; the caller decides whether `converged == false` is fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverPerformance {
    pub solver_name: String,
    pub field_name: String,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub n_iterations: usize,
    pub converged: bool,
    pub singular: bool,
}

impl SolverPerformance {
    pub fn new(solver_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            solver_name: solver_name.into(),
            field_name: field_name.into(),
            initial_residual: 0.0,
            final_residual: 0.0,
            n_iterations: 0,
            converged: false,
            singular: false,
        }
    }

    /// Converged when the final residual is below `tolerance`, or below
    /// `rel_tol` times the initial residual.
    pub fn check_convergence(&mut self, tolerance: f64, rel_tol: f64) -> bool {
        self.converged = self.final_residual < tolerance
            || (rel_tol > SMALL && self.final_residual < rel_tol * self.initial_residual);
        self.converged
    }

    pub fn check_singularity(&mut self, residual: f64) -> bool {
        self.singular = residual < VSMALL;
        self.singular
    }

    /// Worst of two component results, as reported for a segregated
    /// vector solve.
    pub fn max(self, other: SolverPerformance) -> SolverPerformance {
        SolverPerformance {
            solver_name: self.solver_name,
            field_name: self.field_name,
            initial_residual: self.initial_residual.max(other.initial_residual),
            final_residual: self.final_residual.max(other.final_residual),
            n_iterations: self.n_iterations.max(other.n_iterations),
            converged: self.converged && other.converged,
            singular: self.singular || other.singular,
        }
    }

    /// Writes the solver log line.
    pub fn print(&self) {
        if self.converged || self.n_iterations == 0 {
            info!("{}", self);
        } else {
            warn!("{} (not converged)", self);
        }
    }
}

impl fmt::Display for SolverPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:  Solving for {}, Initial residual = {:e}, Final residual = {:e}, No Iterations {}",
            self.solver_name, self.field_name, self.initial_residual, self.final_residual, self.n_iterations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_criteria() {
        let mut perf = SolverPerformance::new("PCG", "p");
        perf.initial_residual = 1.0;
        perf.final_residual = 0.05;
        assert!(!perf.check_convergence(1e-6, 0.0));
        assert!(perf.check_convergence(1e-6, 0.1));
        perf.final_residual = 1e-7;
        assert!(perf.check_convergence(1e-6, 0.0));
    }

    #[test]
    fn test_max_combines_components() {
        let mut a = SolverPerformance::new("smoothSolver", "U");
        a.final_residual = 1e-3;
        a.n_iterations = 4;
        a.converged = true;
        let mut b = a.clone();
        b.final_residual = 1e-2;
        b.n_iterations = 2;
        b.converged = false;
        let worst = a.max(b);
        assert_eq!(worst.final_residual, 1e-2);
        assert_eq!(worst.n_iterations, 4);
        assert!(!worst.converged);
    }

    #[test]
    fn test_log_line() {
        let mut perf = SolverPerformance::new("PBiCGStab", "T");
        perf.initial_residual = 1.0;
        perf.final_residual = 1e-7;
        perf.n_iterations = 3;
        assert_eq!(
            perf.to_string(),
            "PBiCGStab:  Solving for T, Initial residual = 1e0, Final residual = 1e-7, No Iterations 3"
        );
    }
}
