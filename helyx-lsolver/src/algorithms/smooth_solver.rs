use super::{LduSolver, SolverInputs};
use crate::controls::SolverControls;
use crate::solver_performance::SolverPerformance;
use helyx_core::{HelyxCoreError, LduMatrix};
use log::debug;

pub const SMOOTHERS: [&str; 2] = ["GaussSeidel", "symGaussSeidel"];

/// Repeated smoothing sweeps, checking the residual every `n_sweeps`.
pub struct SmoothSolver<'a> {
    inputs: SolverInputs<'a>,
    controls: SolverControls,
    symmetric_sweep: bool,
}

impl<'a> SmoothSolver<'a> {
    pub fn new(inputs: SolverInputs<'a>, controls: SolverControls) -> Result<Self, HelyxCoreError> {
        let symmetric_sweep = match controls.smoother.as_str() {
            "GaussSeidel" => false,
            "symGaussSeidel" => true,
            other => {
                return Err(HelyxCoreError::UnknownSelection {
                    kind: "smoother".to_string(),
                    name: other.to_string(),
                    valid: SMOOTHERS.iter().map(|s| s.to_string()).collect(),
                })
            }
        };
        Ok(Self {
            inputs,
            controls,
            symmetric_sweep,
        })
    }

    fn smooth(&self, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<(), HelyxCoreError> {
        let neg_bou_coeffs: Vec<Vec<f64>> = self
            .inputs
            .interface_bou_coeffs
            .iter()
            .map(|coeffs| coeffs.iter().map(|c| -c).collect())
            .collect();

        for _ in 0..n_sweeps {
            let mut b_prime = source.to_vec();
            // Interface terms move to the right-hand side with the latest psi.
            LduMatrix::update_matrix_interfaces(psi, &mut b_prime, &neg_bou_coeffs, self.inputs.interfaces)?;
            if self.symmetric_sweep {
                let b_backward = b_prime.clone();
                gauss_seidel_forward(self.inputs.matrix, psi, &mut b_prime);
                gauss_seidel_backward(self.inputs.matrix, psi, &b_backward);
            } else {
                gauss_seidel_forward(self.inputs.matrix, psi, &mut b_prime);
            }
        }
        Ok(())
    }
}

/// Lower contributions are pushed into `b_prime` as rows are finished.
fn gauss_seidel_forward(matrix: &LduMatrix, psi: &mut [f64], b_prime: &mut [f64]) {
    let addressing = matrix.addressing();
    let own_start = addressing.owner_start();
    let u = addressing.upper_addr();
    let upper = matrix.upper();
    let lower = matrix.lower();
    let diag = matrix.diag();

    for cell in 0..psi.len() {
        let faces = own_start[cell]..own_start[cell + 1];
        let mut value = b_prime[cell];
        for face in faces.clone() {
            value -= upper[face] * psi[u[face]];
        }
        value /= diag[cell];
        for face in faces {
            b_prime[u[face]] -= lower[face] * value;
        }
        psi[cell] = value;
    }
}

/// Rows in reverse order, every off-diagonal term from the current psi.
fn gauss_seidel_backward(matrix: &LduMatrix, psi: &mut [f64], b_prime: &[f64]) {
    let addressing = matrix.addressing();
    let l = addressing.lower_addr();
    let u = addressing.upper_addr();
    let own_start = addressing.owner_start();
    let losort = addressing.losort();
    let upper = matrix.upper();
    let lower = matrix.lower();
    let diag = matrix.diag();

    let mut losort_start = vec![0; psi.len() + 1];
    for &cell in u {
        losort_start[cell + 1] += 1;
    }
    for cell in 0..psi.len() {
        losort_start[cell + 1] += losort_start[cell];
    }

    for cell in (0..psi.len()).rev() {
        let mut value = b_prime[cell];
        for face in own_start[cell]..own_start[cell + 1] {
            value -= upper[face] * psi[u[face]];
        }
        for &face in &losort[losort_start[cell]..losort_start[cell + 1]] {
            value -= lower[face] * psi[l[face]];
        }
        psi[cell] = value / diag[cell];
    }
}

impl LduSolver for SmoothSolver<'_> {
    fn name(&self) -> &str {
        "smoothSolver"
    }

    fn solve(&self, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance, HelyxCoreError> {
        let mut perf = SolverPerformance::new(self.name(), self.inputs.field_name);
        let n_sweeps = self.controls.n_sweeps.max(1);

        let mut a_psi = vec![0.0; psi.len()];
        self.inputs.amul(psi, &mut a_psi)?;
        let norm_factor = self.inputs.norm_factor(psi, source, &a_psi)?;
        let residual = |a_psi: &[f64]| -> Vec<f64> { source.iter().zip(a_psi).map(|(b, ax)| b - ax).collect() };

        perf.initial_residual = self.inputs.g_sum_mag(&residual(&a_psi))? / norm_factor;
        perf.final_residual = perf.initial_residual;

        if self.controls.min_iter > 0 || !perf.check_convergence(self.controls.tolerance, self.controls.rel_tol) {
            loop {
                self.smooth(psi, source, n_sweeps)?;
                self.inputs.amul(psi, &mut a_psi)?;
                perf.final_residual = self.inputs.g_sum_mag(&residual(&a_psi))? / norm_factor;
                perf.n_iterations += n_sweeps;
                debug!("Iteration {}: residual norm = {}", perf.n_iterations, perf.final_residual);

                let converged = perf.check_convergence(self.controls.tolerance, self.controls.rel_tol);
                if (perf.n_iterations >= self.controls.max_iter || converged)
                    && perf.n_iterations >= self.controls.min_iter
                {
                    break;
                }
            }
        }

        perf.print();
        Ok(perf)
    }
}
