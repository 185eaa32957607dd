use super::{LduSolver, SolverInputs};
use crate::controls::SolverControls;
use crate::preconditioner::{new_preconditioner, Preconditioner};
use crate::solver_performance::SolverPerformance;
use helyx_core::HelyxCoreError;
use log::{debug, info, warn};

/// Preconditioned stabilised bi-conjugate gradient, for symmetric and
/// asymmetric matrices.
///
/// A breakdown (vanishing `rA0.rA` or `omega`) stops the iteration and
/// returns the record with `singular` set.
pub struct PBiCGStab<'a> {
    inputs: SolverInputs<'a>,
    controls: SolverControls,
    preconditioner: Box<dyn Preconditioner + 'a>,
}

impl<'a> PBiCGStab<'a> {
    pub fn new(inputs: SolverInputs<'a>, controls: SolverControls) -> Result<Self, HelyxCoreError> {
        let preconditioner = new_preconditioner(&controls.preconditioner, inputs.matrix)?;
        Ok(Self {
            inputs,
            controls,
            preconditioner,
        })
    }
}

impl LduSolver for PBiCGStab<'_> {
    fn name(&self) -> &str {
        "PBiCGStab"
    }

    fn solve(&self, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance, HelyxCoreError> {
        let n_cells = psi.len();
        let tolerance = self.controls.tolerance;
        let rel_tol = self.controls.rel_tol;
        let mut perf = SolverPerformance::new(self.name(), self.inputs.field_name);

        let mut y_a = vec![0.0; n_cells];
        self.inputs.amul(psi, &mut y_a)?;
        let mut r_a: Vec<f64> = source.iter().zip(&y_a).map(|(b, ax)| b - ax).collect();

        let norm_factor = self.inputs.norm_factor(psi, source, &y_a)?;
        perf.initial_residual = self.inputs.g_sum_mag(&r_a)? / norm_factor;
        perf.final_residual = perf.initial_residual;
        info!("BiCGSTAB Initial Residual Norm: {}", perf.initial_residual);

        if self.controls.min_iter > 0 || !perf.check_convergence(tolerance, rel_tol) {
            let mut p_a = vec![0.0; n_cells];
            let mut ay_a = vec![0.0; n_cells];
            let mut s_a = vec![0.0; n_cells];
            let mut z_a = vec![0.0; n_cells];
            let mut t_a = vec![0.0; n_cells];
            let r_a0 = r_a.clone();

            let mut r_a0_r_a = 0.0;
            let mut alpha = 0.0;
            let mut omega: f64 = 0.0;

            loop {
                let r_a0_r_a_old = r_a0_r_a;
                r_a0_r_a = self.inputs.g_sum_prod(&r_a0, &r_a)?;

                if perf.check_singularity(r_a0_r_a.abs()) {
                    warn!("BiCGSTAB breakdown: rho is too small at iteration {}", perf.n_iterations);
                    break;
                }

                if perf.n_iterations == 0 {
                    p_a.copy_from_slice(&r_a);
                } else {
                    if perf.check_singularity(omega.abs()) {
                        warn!("BiCGSTAB breakdown: omega is too small at iteration {}", perf.n_iterations);
                        break;
                    }
                    let beta = (r_a0_r_a / r_a0_r_a_old) * (alpha / omega);
                    for cell in 0..n_cells {
                        p_a[cell] = r_a[cell] + beta * (p_a[cell] - omega * ay_a[cell]);
                    }
                }

                self.preconditioner.precondition(&mut y_a, &p_a);
                self.inputs.amul(&y_a, &mut ay_a)?;
                let r_a0_ay_a = self.inputs.g_sum_prod(&r_a0, &ay_a)?;
                alpha = r_a0_r_a / r_a0_ay_a;

                for cell in 0..n_cells {
                    s_a[cell] = r_a[cell] - alpha * ay_a[cell];
                }
                perf.final_residual = self.inputs.g_sum_mag(&s_a)? / norm_factor;

                if perf.check_convergence(tolerance, rel_tol) {
                    for cell in 0..n_cells {
                        psi[cell] += alpha * y_a[cell];
                    }
                    perf.n_iterations += 1;
                    debug!("Iteration {}: residual norm = {}", perf.n_iterations, perf.final_residual);
                    break;
                }

                self.preconditioner.precondition(&mut z_a, &s_a);
                self.inputs.amul(&z_a, &mut t_a)?;
                let t_a_t_a = self.inputs.g_sum_prod(&t_a, &t_a)?;
                omega = self.inputs.g_sum_prod(&t_a, &s_a)? / t_a_t_a;

                for cell in 0..n_cells {
                    psi[cell] += alpha * y_a[cell] + omega * z_a[cell];
                    r_a[cell] = s_a[cell] - omega * t_a[cell];
                }
                perf.final_residual = self.inputs.g_sum_mag(&r_a)? / norm_factor;
                perf.n_iterations += 1;
                debug!("Iteration {}: residual norm = {}", perf.n_iterations, perf.final_residual);

                let converged = perf.check_convergence(tolerance, rel_tol);
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
