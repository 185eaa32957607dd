use helyx_lsolver::{
    algorithms::{ASYMMETRIC_SOLVERS, SYMMETRIC_SOLVERS},
    new_solver, LduAddressing, LduMatrix, SerialCommunicator, SolverControls, SolverInputs,
};
use std::sync::Arc;
use std::time::Instant;

/// 1D diffusion over `n` cells with both ends fixed at zero.
/// With `peclet > 0` an upwind convection term makes it asymmetric.
fn create_laplacian(n: usize, peclet: f64) -> LduMatrix {
    let addressing = LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect(), vec![])
        .expect("Failed to create chain addressing");
    let mut matrix = LduMatrix::from_coeffs(Arc::new(addressing), vec![2.0 + peclet; n], vec![-1.0; n - 1], None)
        .expect("Failed to create matrix");
    if peclet > 0.0 {
        matrix.lower_mut().iter_mut().for_each(|l| *l = -1.0 - peclet);
    }
    matrix
}

/// Creates a vector b of size n with b[i] = sin(i/n).
fn create_sin_vector(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 / n as f64).sin()).collect()
}

fn main() {
    // Initialize logging based on RUST_LOG environment variable
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n = 500;
    let b = create_sin_vector(n);
    let comm = SerialCommunicator::new();

    for (peclet, solvers) in [(0.0, &SYMMETRIC_SOLVERS[..]), (0.5, &ASYMMETRIC_SOLVERS[..])] {
        let matrix = create_laplacian(n, peclet);
        log::info!(
            "Solving {} {}x{} system",
            if matrix.symmetric() { "symmetric" } else { "asymmetric" },
            n,
            n
        );
        for &solver in solvers {
            let controls = SolverControls::new(solver)
                .with_preconditioner(if matrix.symmetric() { "DIC" } else { "DILU" })
                .with_tolerance(1e-8, 0.0)
                .with_max_iter(n * 20);
            let inputs = SolverInputs {
                field_name: "T",
                matrix: &matrix,
                interface_bou_coeffs: &[],
                interface_int_coeffs: &[],
                interfaces: &[],
                reduce: &comm,
            };
            let mut psi = vec![0.0; n];
            let start_time = Instant::now();
            match new_solver(inputs, &controls).and_then(|s| s.solve(&mut psi, &b)) {
                Ok(perf) => log::info!("  {} in {:?}", perf, start_time.elapsed()),
                Err(e) => log::error!("  {} failed: {}", solver, e),
            }
        }
    }
}
