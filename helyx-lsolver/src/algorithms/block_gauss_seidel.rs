use crate::controls::SolverControls;
use crate::solver_performance::{SolverPerformance, SMALL};
use helyx_core::{BlockLduMatrix, CoeffField, GlobalReduce, HelyxCoreError, LduInterfaceFieldPtrs};
use log::{debug, info};

/// Gauss-Seidel on a block-coupled matrix. Each row solves its diagonal
/// block exactly, so the components of a cell are updated together.
#[derive(Debug, Clone)]
pub struct BlockGaussSeidel {
    pub tolerance: f64,
    pub rel_tol: f64,
    pub max_iter: usize,
    pub min_iter: usize,
}

impl Default for BlockGaussSeidel {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iter: 1000,
            min_iter: 0,
        }
    }
}

impl BlockGaussSeidel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(tolerance: f64, max_iter: usize) -> Self {
        Self {
            tolerance,
            max_iter,
            ..Default::default()
        }
    }

    pub fn from_controls(controls: &SolverControls) -> Self {
        Self {
            tolerance: controls.tolerance,
            rel_tol: controls.rel_tol,
            max_iter: controls.max_iter,
            min_iter: controls.min_iter,
        }
    }

    fn residual_norm<const N: usize>(
        matrix: &BlockLduMatrix<N>,
        interfaces: &LduInterfaceFieldPtrs,
        psi: &[[f64; N]],
        source: &[[f64; N]],
        reduce: &dyn GlobalReduce,
    ) -> Result<f64, HelyxCoreError> {
        let a_psi = matrix.amul(psi, interfaces)?;
        let local: f64 = source
            .iter()
            .zip(&a_psi)
            .map(|(b, ax)| b.iter().zip(ax).map(|(x, y)| (x - y).abs()).sum::<f64>())
            .sum();
        reduce.global_sum(local)
    }

    /// Residuals are normalised by `sum|source| + small`.
    pub fn solve<const N: usize>(
        &self,
        field_name: &str,
        matrix: &BlockLduMatrix<N>,
        interfaces: &LduInterfaceFieldPtrs,
        psi: &mut [[f64; N]],
        source: &[[f64; N]],
        reduce: &dyn GlobalReduce,
    ) -> Result<SolverPerformance, HelyxCoreError> {
        let diag = matrix.diag().ok_or_else(|| {
            HelyxCoreError::UnsupportedOperation(format!("block solve of {} without a diagonal", field_name))
        })?;
        if psi.len() != matrix.size() || source.len() != matrix.size() {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "block solve of {} rows given psi {} and source {}",
                matrix.size(),
                psi.len(),
                source.len()
            )));
        }

        let mut perf = SolverPerformance::new("BlockGaussSeidel", field_name);
        let source_norm: f64 = source.iter().flat_map(|b| b.iter()).map(|x| x.abs()).sum();
        let norm_factor = reduce.global_sum(source_norm)? + SMALL;

        perf.initial_residual = Self::residual_norm(matrix, interfaces, psi, source, reduce)? / norm_factor;
        perf.final_residual = perf.initial_residual;
        info!("BlockGaussSeidel Initial Residual Norm: {}", perf.initial_residual);

        if self.min_iter > 0 || !perf.check_convergence(self.tolerance, self.rel_tol) {
            loop {
                self.sweep(matrix, interfaces, psi, source, diag)?;
                perf.final_residual = Self::residual_norm(matrix, interfaces, psi, source, reduce)? / norm_factor;
                perf.n_iterations += 1;
                debug!("Iteration {}: residual norm = {}", perf.n_iterations, perf.final_residual);

                let converged = perf.check_convergence(self.tolerance, self.rel_tol);
                if (perf.n_iterations >= self.max_iter || converged) && perf.n_iterations >= self.min_iter {
                    break;
                }
            }
        }

        perf.print();
        Ok(perf)
    }

    fn sweep<const N: usize>(
        &self,
        matrix: &BlockLduMatrix<N>,
        interfaces: &LduInterfaceFieldPtrs,
        psi: &mut [[f64; N]],
        source: &[[f64; N]],
        diag: &CoeffField<N>,
    ) -> Result<(), HelyxCoreError> {
        let mut b_prime = source.to_vec();

        for (patch, interface) in interfaces.iter().enumerate() {
            let (Some(interface), Some(coeffs)) = (interface, matrix.couple_upper(patch)) else {
                continue;
            };
            let mut pnf = vec![[0.0; N]; interface.face_cells().len()];
            for d in 0..N {
                let component: Vec<f64> = psi.iter().map(|v| v[d]).collect();
                for (face, value) in interface.neighbour_values(&component)?.into_iter().enumerate() {
                    pnf[face][d] = value;
                }
            }
            for (face, &cell) in interface.face_cells().iter().enumerate() {
                let contribution = coeffs.apply(face, &pnf[face]);
                for d in 0..N {
                    b_prime[cell][d] += contribution[d];
                }
            }
        }

        let addressing = matrix.addressing();
        let own_start = addressing.owner_start();
        let u = addressing.upper_addr();
        for cell in 0..psi.len() {
            let faces = own_start[cell]..own_start[cell + 1];
            let mut rhs = b_prime[cell];
            if let Some(upper) = matrix.upper() {
                for face in faces.clone() {
                    let term = upper.apply(face, &psi[u[face]]);
                    for d in 0..N {
                        rhs[d] -= term[d];
                    }
                }
            }
            let value = diag.inverse_apply(cell, &rhs)?;
            if let Some(lower) = matrix.lower() {
                for face in faces {
                    let term = lower.apply(face, &value);
                    for d in 0..N {
                        b_prime[u[face]][d] -= term[d];
                    }
                }
            }
            psi[cell] = value;
        }
        Ok(())
    }
}
