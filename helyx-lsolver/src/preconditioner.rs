use helyx_core::{HelyxCoreError, LduMatrix};

/// Approximate inverse applied once per Krylov iteration.
pub trait Preconditioner {
    /// `w_a ~ A^-1 r_a`
    fn precondition(&self, w_a: &mut [f64], r_a: &[f64]);
}

pub const PRECONDITIONERS: [&str; 4] = ["none", "diagonal", "DIC", "DILU"];

pub fn new_preconditioner<'a>(
    name: &str,
    matrix: &'a LduMatrix,
) -> Result<Box<dyn Preconditioner + 'a>, HelyxCoreError> {
    match name {
        "none" => Ok(Box::new(NoPreconditioner)),
        "diagonal" => Ok(Box::new(DiagonalPreconditioner::new(matrix))),
        "DIC" if matrix.symmetric() => Ok(Box::new(DiluPreconditioner::new(matrix))),
        "DILU" => Ok(Box::new(DiluPreconditioner::new(matrix))),
        other => Err(HelyxCoreError::UnknownSelection {
            kind: if matrix.symmetric() {
                "symmetric matrix preconditioner"
            } else {
                "asymmetric matrix preconditioner"
            }
            .to_string(),
            name: other.to_string(),
            valid: PRECONDITIONERS
                .iter()
                .filter(|&&p| p != "DIC" || matrix.symmetric())
                .map(|p| p.to_string())
                .collect(),
        }),
    }
}

#[derive(Debug, Default)]
pub struct NoPreconditioner;

impl Preconditioner for NoPreconditioner {
    fn precondition(&self, w_a: &mut [f64], r_a: &[f64]) {
        w_a.copy_from_slice(r_a);
    }
}

#[derive(Debug)]
pub struct DiagonalPreconditioner {
    r_d: Vec<f64>,
}

impl DiagonalPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        Self {
            r_d: matrix.diag().iter().map(|d| 1.0 / d).collect(),
        }
    }
}

impl Preconditioner for DiagonalPreconditioner {
    fn precondition(&self, w_a: &mut [f64], r_a: &[f64]) {
        for ((w, r), d) in w_a.iter_mut().zip(r_a).zip(&self.r_d) {
            *w = r * d;
        }
    }
}

/// Incomplete LU with zero fill-in on the diagonal only. For a symmetric
/// matrix this is the incomplete Cholesky variant.
#[derive(Debug)]
pub struct DiluPreconditioner<'a> {
    matrix: &'a LduMatrix,
    r_d: Vec<f64>,
}

impl<'a> DiluPreconditioner<'a> {
    pub fn new(matrix: &'a LduMatrix) -> Self {
        let mut r_d = matrix.diag().to_vec();
        let l = matrix.addressing().lower_addr();
        let u = matrix.addressing().upper_addr();
        let upper = matrix.upper();
        let lower = matrix.lower();
        for face in 0..l.len() {
            r_d[u[face]] -= upper[face] * lower[face] / r_d[l[face]];
        }
        for d in r_d.iter_mut() {
            *d = 1.0 / *d;
        }
        Self { matrix, r_d }
    }

    pub fn reciprocal_diag(&self) -> &[f64] {
        &self.r_d
    }
}

impl Preconditioner for DiluPreconditioner<'_> {
    fn precondition(&self, w_a: &mut [f64], r_a: &[f64]) {
        let addressing = self.matrix.addressing();
        let l = addressing.lower_addr();
        let u = addressing.upper_addr();
        let losort = addressing.losort();
        let upper = self.matrix.upper();
        let lower = self.matrix.lower();

        for ((w, r), d) in w_a.iter_mut().zip(r_a).zip(&self.r_d) {
            *w = r * d;
        }
        for &face in losort {
            w_a[u[face]] -= self.r_d[u[face]] * lower[face] * w_a[l[face]];
        }
        for face in (0..l.len()).rev() {
            w_a[l[face]] -= self.r_d[l[face]] * upper[face] * w_a[u[face]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helyx_core::LduAddressing;
    use std::sync::Arc;

    fn chain(n: usize) -> LduMatrix {
        let lower: Vec<usize> = (0..n - 1).collect();
        let upper: Vec<usize> = (1..n).collect();
        let addressing = Arc::new(LduAddressing::new(n, lower, upper, vec![]).unwrap());
        LduMatrix::from_coeffs(addressing, vec![2.0; n], vec![-1.0; n - 1], None).unwrap()
    }

    #[test]
    fn test_dilu_is_exact_for_tridiagonal() {
        // No fill-in for a chain, so the factorisation is a direct solve.
        let matrix = chain(5);
        let precon = DiluPreconditioner::new(&matrix);
        let b = vec![1.0, 0.0, 0.0, 0.0, 1.0];
        let mut x = vec![0.0; 5];
        precon.precondition(&mut x, &b);
        for value in x {
            assert!((value - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dic_rejected_for_asymmetric() {
        let mut matrix = chain(3);
        matrix.lower_mut()[0] = -0.5;
        assert!(matches!(
            new_preconditioner("DIC", &matrix),
            Err(HelyxCoreError::UnknownSelection { .. })
        ));
        assert!(new_preconditioner("DILU", &matrix).is_ok());
    }
}
