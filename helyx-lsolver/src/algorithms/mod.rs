//! Iterative and direct solvers for scalar LDU systems.
//!
//! Every solver works on the rank-local rows of a matrix; interface
//! contributions (cyclic, region-coupled, processor) go through the
//! matrix product and global sums go through [`GlobalReduce`], so the
//! same code runs serially and distributed.

pub mod block_gauss_seidel;
pub mod diagonal;
pub mod pbicgstab;
pub mod pcg;
pub mod smooth_solver;

use crate::controls::SolverControls;
use crate::solver_performance::{SolverPerformance, SMALL};
use helyx_core::{GlobalReduce, HelyxCoreError, LduInterfaceFieldPtrs, LduMatrix};

pub use block_gauss_seidel::BlockGaussSeidel;
pub use diagonal::DiagonalSolver;
pub use pbicgstab::PBiCGStab;
pub use pcg::Pcg;
pub use smooth_solver::SmoothSolver;

/// Everything a solver needs besides the right-hand side.
#[derive(Clone, Copy)]
pub struct SolverInputs<'a> {
    pub field_name: &'a str,
    pub matrix: &'a LduMatrix,
    pub interface_bou_coeffs: &'a [Vec<f64>],
    pub interface_int_coeffs: &'a [Vec<f64>],
    pub interfaces: &'a LduInterfaceFieldPtrs<'a>,
    pub reduce: &'a dyn GlobalReduce,
}

impl<'a> SolverInputs<'a> {
    pub(crate) fn amul(&self, psi: &[f64], result: &mut [f64]) -> Result<(), HelyxCoreError> {
        self.matrix
            .amul(psi, result, self.interface_bou_coeffs, self.interfaces)
    }

    pub(crate) fn g_sum_mag(&self, x: &[f64]) -> Result<f64, HelyxCoreError> {
        self.reduce.global_sum(x.iter().map(|v| v.abs()).sum())
    }

    pub(crate) fn g_sum_prod(&self, a: &[f64], b: &[f64]) -> Result<f64, HelyxCoreError> {
        self.reduce.global_sum(a.iter().zip(b).map(|(x, y)| x * y).sum())
    }

    /// Residual normalisation, `sum(|A psi - pA| + |source - pA|)` with
    /// `pA = sumA * average(psi)`, so the scaled residual does not depend
    /// on the level of the solution.
    pub(crate) fn norm_factor(&self, psi: &[f64], source: &[f64], a_psi: &[f64]) -> Result<f64, HelyxCoreError> {
        let n_cells = self.reduce.global_sum(psi.len() as f64)?;
        let psi_sum = self.reduce.global_sum(psi.iter().sum())?;
        let average = if n_cells > 0.0 { psi_sum / n_cells } else { 0.0 };

        let sum_a = self.matrix.sum_a(self.interface_bou_coeffs, self.interfaces);
        let local: f64 = sum_a
            .iter()
            .zip(a_psi)
            .zip(source)
            .map(|((s, ap), b)| {
                let p_a = s * average;
                (ap - p_a).abs() + (b - p_a).abs()
            })
            .sum();
        Ok(self.reduce.global_sum(local)? + SMALL)
    }
}

/// A run-time selected scalar solver bound to its matrix.
pub trait LduSolver {
    fn name(&self) -> &str;

    /// Solves in place, starting from the current `psi`.
    fn solve(&self, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance, HelyxCoreError>;
}

pub const SYMMETRIC_SOLVERS: [&str; 4] = ["PCG", "PBiCGStab", "smoothSolver", "diagonal"];
pub const ASYMMETRIC_SOLVERS: [&str; 3] = ["PBiCGStab", "smoothSolver", "diagonal"];

/// Selects the solver named in `controls`. The conjugate gradient is only
/// offered for symmetric matrices.
pub fn new_solver<'a>(
    inputs: SolverInputs<'a>,
    controls: &SolverControls,
) -> Result<Box<dyn LduSolver + 'a>, HelyxCoreError> {
    let symmetric = inputs.matrix.symmetric();
    let valid: &[&str] = if symmetric { &SYMMETRIC_SOLVERS } else { &ASYMMETRIC_SOLVERS };
    if !valid.contains(&controls.solver.as_str()) {
        return Err(HelyxCoreError::UnknownSelection {
            kind: if symmetric { "symmetric matrix solver" } else { "asymmetric matrix solver" }.to_string(),
            name: controls.solver.clone(),
            valid: valid.iter().map(|s| s.to_string()).collect(),
        });
    }

    let solver: Box<dyn LduSolver + 'a> = match controls.solver.as_str() {
        "PCG" => Box::new(Pcg::new(inputs, controls.clone())?),
        "PBiCGStab" => Box::new(PBiCGStab::new(inputs, controls.clone())?),
        "smoothSolver" => Box::new(SmoothSolver::new(inputs, controls.clone())?),
        _ => Box::new(DiagonalSolver::new(inputs)),
    };
    Ok(solver)
}
