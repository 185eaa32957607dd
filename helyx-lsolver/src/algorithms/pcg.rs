use super::{LduSolver, SolverInputs};
use crate::controls::SolverControls;
use crate::preconditioner::{new_preconditioner, Preconditioner};
use crate::solver_performance::SolverPerformance;
use helyx_core::HelyxCoreError;
use log::{debug, info, warn};

/// Preconditioned conjugate gradient for symmetric matrices.
pub struct Pcg<'a> {
    inputs: SolverInputs<'a>,
    controls: SolverControls,
    preconditioner: Box<dyn Preconditioner + 'a>,
}

impl<'a> Pcg<'a> {
    pub fn new(inputs: SolverInputs<'a>, controls: SolverControls) -> Result<Self, HelyxCoreError> {
        let preconditioner = new_preconditioner(&controls.preconditioner, inputs.matrix)?;
        Ok(Self {
            inputs,
            controls,
            preconditioner,
        })
    }
}

impl LduSolver for Pcg<'_> {
    fn name(&self) -> &str {
        "PCG"
    }

    fn solve(&self, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance, HelyxCoreError> {
        let n_cells = psi.len();
        let mut perf = SolverPerformance::new(self.name(), self.inputs.field_name);

        let mut w_a = vec![0.0; n_cells];
        self.inputs.amul(psi, &mut w_a)?;
        let mut r_a: Vec<f64> = source.iter().zip(&w_a).map(|(b, ax)| b - ax).collect();

        let norm_factor = self.inputs.norm_factor(psi, source, &w_a)?;
        debug!("PCG normalisation factor for {} = {}", self.inputs.field_name, norm_factor);

        perf.initial_residual = self.inputs.g_sum_mag(&r_a)? / norm_factor;
        perf.final_residual = perf.initial_residual;
        info!("PCG Initial Residual Norm: {}", perf.initial_residual);

        if self.controls.min_iter > 0 || !perf.check_convergence(self.controls.tolerance, self.controls.rel_tol) {
            let mut p_a = vec![0.0; n_cells];
            let mut w_a_r_a = f64::MAX;

            loop {
                let w_a_r_a_old = w_a_r_a;
                self.preconditioner.precondition(&mut w_a, &r_a);
                w_a_r_a = self.inputs.g_sum_prod(&w_a, &r_a)?;

                if perf.n_iterations == 0 {
                    p_a.copy_from_slice(&w_a);
                } else {
                    let beta = w_a_r_a / w_a_r_a_old;
                    for (p, w) in p_a.iter_mut().zip(&w_a) {
                        *p = w + beta * *p;
                    }
                }

                self.inputs.amul(&p_a, &mut w_a)?;
                let w_a_p_a = self.inputs.g_sum_prod(&w_a, &p_a)?;
                if perf.check_singularity(w_a_p_a.abs() / norm_factor) {
                    warn!("PCG breakdown for {}: wA.pA vanished", self.inputs.field_name);
                    break;
                }

                let alpha = w_a_r_a / w_a_p_a;
                for cell in 0..n_cells {
                    psi[cell] += alpha * p_a[cell];
                    r_a[cell] -= alpha * w_a[cell];
                }
                perf.final_residual = self.inputs.g_sum_mag(&r_a)? / norm_factor;
                perf.n_iterations += 1;
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
