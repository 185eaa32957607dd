use crate::error::{HelyxCoreError, Result};
use crate::fatal_error;
use crate::interface::LduInterfaceFieldPtrs;
use crate::ldu_addressing::LduAddressing;
use crate::sparse_matrix::{SparseMatrix, Triplete};
use crate::traits::Matrix;
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::sync::Arc;

/// Scalar matrix in lower/diagonal/upper form over an [`LduAddressing`].
///
/// `upper[f]` sits in row `lower_addr[f]`, column `upper_addr[f]`;
/// `lower[f]` in row `upper_addr[f]`, column `lower_addr[f]`. A matrix
/// without its own lower coefficients is symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct LduMatrix {
    addressing: Arc<LduAddressing>,
    diag: Vec<f64>,
    upper: Vec<f64>,
    lower: Option<Vec<f64>>,
}

impl LduMatrix {
    /// A zero symmetric matrix.
    pub fn new(addressing: Arc<LduAddressing>) -> Self {
        let diag = vec![0.0; addressing.size()];
        let upper = vec![0.0; addressing.n_faces()];
        Self {
            addressing,
            diag,
            upper,
            lower: None,
        }
    }

    pub fn from_coeffs(
        addressing: Arc<LduAddressing>,
        diag: Vec<f64>,
        upper: Vec<f64>,
        lower: Option<Vec<f64>>,
    ) -> Result<Self> {
        if diag.len() != addressing.size() {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "diagonal has {} entries for {} rows",
                diag.len(),
                addressing.size()
            )));
        }
        let n_faces = addressing.n_faces();
        if upper.len() != n_faces || lower.as_ref().is_some_and(|l| l.len() != n_faces) {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "off-diagonal coefficients do not match {} faces",
                n_faces
            )));
        }
        Ok(Self {
            addressing,
            diag,
            upper,
            lower,
        })
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn size(&self) -> usize {
        self.diag.len()
    }

    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    pub fn diag_mut(&mut self) -> &mut Vec<f64> {
        &mut self.diag
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut Vec<f64> {
        &mut self.upper
    }

    /// Lower coefficients; the upper ones when the matrix is symmetric.
    pub fn lower(&self) -> &[f64] {
        self.lower.as_deref().unwrap_or(&self.upper)
    }

    /// Lower coefficients, split off from the upper ones on first use.
    pub fn lower_mut(&mut self) -> &mut Vec<f64> {
        let upper = &self.upper;
        self.lower.get_or_insert_with(|| upper.clone())
    }

    pub fn symmetric(&self) -> bool {
        self.lower.is_none()
    }

    pub fn asymmetric(&self) -> bool {
        self.lower.is_some()
    }

    fn check_vector(&self, name: &str, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "{} has {} entries for {} rows",
                name,
                len,
                self.size()
            )));
        }
        Ok(())
    }

    /// Adds every set interface's contribution, `result[fc] -= coeffs*pnf`.
    pub fn update_matrix_interfaces(
        psi: &[f64],
        result: &mut [f64],
        coeffs: &[Vec<f64>],
        interfaces: &LduInterfaceFieldPtrs,
    ) -> Result<()> {
        for (patch, interface) in interfaces.iter().enumerate() {
            if let Some(interface) = interface {
                let patch_coeffs = coeffs.get(patch).ok_or_else(|| {
                    HelyxCoreError::InvalidAddressing(format!(
                        "no interface coefficients for patch {}",
                        patch
                    ))
                })?;
                interface.update_interface_matrix(psi, result, patch_coeffs)?;
            }
        }
        Ok(())
    }

    /// `result = A psi`, including interface contributions.
    pub fn amul(
        &self,
        psi: &[f64],
        result: &mut [f64],
        interface_bou_coeffs: &[Vec<f64>],
        interfaces: &LduInterfaceFieldPtrs,
    ) -> Result<()> {
        self.check_vector("psi", psi.len())?;
        self.check_vector("result", result.len())?;

        for ((r, d), p) in result.iter_mut().zip(&self.diag).zip(psi) {
            *r = d * p;
        }
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        for face in 0..l.len() {
            result[u[face]] += lower[face] * psi[l[face]];
            result[l[face]] += self.upper[face] * psi[u[face]];
        }
        Self::update_matrix_interfaces(psi, result, interface_bou_coeffs, interfaces)
    }

    /// `result = A^T psi`, with interfaces using the internal coefficients.
    pub fn tmul(
        &self,
        psi: &[f64],
        result: &mut [f64],
        interface_int_coeffs: &[Vec<f64>],
        interfaces: &LduInterfaceFieldPtrs,
    ) -> Result<()> {
        self.check_vector("psi", psi.len())?;
        self.check_vector("result", result.len())?;

        for ((r, d), p) in result.iter_mut().zip(&self.diag).zip(psi) {
            *r = d * p;
        }
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        for face in 0..l.len() {
            result[u[face]] += self.upper[face] * psi[l[face]];
            result[l[face]] += lower[face] * psi[u[face]];
        }
        Self::update_matrix_interfaces(psi, result, interface_int_coeffs, interfaces)
    }

    /// Row sums including coupled boundary coefficients.
    pub fn sum_a(&self, interface_bou_coeffs: &[Vec<f64>], interfaces: &LduInterfaceFieldPtrs) -> Vec<f64> {
        let mut sum_a = self.diag.clone();
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        for face in 0..l.len() {
            sum_a[u[face]] += lower[face];
            sum_a[l[face]] += self.upper[face];
        }
        for (patch, interface) in interfaces.iter().enumerate() {
            if let (Some(interface), Some(coeffs)) = (interface, interface_bou_coeffs.get(patch)) {
                for (&cell, &coeff) in interface.face_cells().iter().zip(coeffs) {
                    sum_a[cell] -= coeff;
                }
            }
        }
        sum_a
    }

    /// `source - A psi`.
    pub fn residual(
        &self,
        psi: &[f64],
        source: &[f64],
        interface_bou_coeffs: &[Vec<f64>],
        interfaces: &LduInterfaceFieldPtrs,
    ) -> Result<Vec<f64>> {
        self.check_vector("source", source.len())?;
        let mut a_psi = vec![0.0; self.size()];
        self.amul(psi, &mut a_psi, interface_bou_coeffs, interfaces)?;
        Ok(source.iter().zip(&a_psi).map(|(b, ax)| b - ax).collect())
    }

    /// Off-diagonal part applied to `psi`, negated.
    pub fn h_op(&self, psi: &[f64]) -> Result<Vec<f64>> {
        self.check_vector("psi", psi.len())?;
        let mut h = vec![0.0; self.size()];
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        for face in 0..l.len() {
            h[u[face]] -= lower[face] * psi[l[face]];
            h[l[face]] -= self.upper[face] * psi[u[face]];
        }
        Ok(h)
    }

    /// Sets the diagonal to minus the sum of the off-diagonal column entries.
    pub fn neg_sum_diag(&mut self) {
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower.as_deref().unwrap_or(&self.upper);
        for face in 0..l.len() {
            self.diag[l[face]] -= lower[face];
            self.diag[u[face]] -= self.upper[face];
        }
    }

    /// Per-row sum of the off-diagonal magnitudes.
    pub fn sum_mag_off_diag(&self) -> Vec<f64> {
        let mut sum_off = vec![0.0; self.size()];
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        for face in 0..l.len() {
            sum_off[u[face]] += lower[face].abs();
            sum_off[l[face]] += self.upper[face].abs();
        }
        sum_off
    }

    pub fn negate(&mut self) {
        *self *= -1.0;
    }

    /// Row scaling by a per-cell factor.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        if factors.len() != self.size() {
            fatal_error!(
                "LduMatrix::scale_rows",
                "LduMatrix",
                "size mismatch: {} rows, {} factors",
                self.size(),
                factors.len()
            );
        }
        self.lower_mut();
        let addressing = Arc::clone(&self.addressing);
        let l = addressing.lower_addr();
        let u = addressing.upper_addr();
        self.diag.iter_mut().zip(factors).for_each(|(d, s)| *d *= s);
        for (face, upper) in self.upper.iter_mut().enumerate() {
            *upper *= factors[l[face]];
        }
        if let Some(lower) = self.lower.as_mut() {
            for (face, lower) in lower.iter_mut().enumerate() {
                *lower *= factors[u[face]];
            }
        }
    }

    /// Assembled copy in CSR form.
    pub fn to_sparse(&self) -> Result<SparseMatrix> {
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        let lower = self.lower();
        let mut triplets = Vec::with_capacity(self.size() + 2 * l.len());
        for (i, &d) in self.diag.iter().enumerate() {
            triplets.push(Triplete::new(i, i, d));
        }
        for face in 0..l.len() {
            triplets.push(Triplete::new(l[face], u[face], self.upper[face]));
            triplets.push(Triplete::new(u[face], l[face], lower[face]));
        }
        SparseMatrix::from_triplets(self.size(), self.size(), triplets)
    }

    fn check_same_addressing(&self, other: &LduMatrix, operation: &str) {
        if !Arc::ptr_eq(&self.addressing, &other.addressing) && self.addressing != other.addressing {
            fatal_error!(operation, "LduMatrix", "matrices have different addressing");
        }
    }
}

impl AddAssign<&LduMatrix> for LduMatrix {
    fn add_assign(&mut self, other: &LduMatrix) {
        self.check_same_addressing(other, "LduMatrix::operator+=");
        self.diag.iter_mut().zip(&other.diag).for_each(|(a, b)| *a += b);
        if self.asymmetric() || other.asymmetric() {
            let lower = self.lower_mut();
            lower.iter_mut().zip(other.lower()).for_each(|(a, b)| *a += b);
        }
        self.upper.iter_mut().zip(&other.upper).for_each(|(a, b)| *a += b);
    }
}

impl SubAssign<&LduMatrix> for LduMatrix {
    fn sub_assign(&mut self, other: &LduMatrix) {
        self.check_same_addressing(other, "LduMatrix::operator-=");
        self.diag.iter_mut().zip(&other.diag).for_each(|(a, b)| *a -= b);
        if self.asymmetric() || other.asymmetric() {
            let lower = self.lower_mut();
            lower.iter_mut().zip(other.lower()).for_each(|(a, b)| *a -= b);
        }
        self.upper.iter_mut().zip(&other.upper).for_each(|(a, b)| *a -= b);
    }
}

impl MulAssign<f64> for LduMatrix {
    fn mul_assign(&mut self, s: f64) {
        self.diag.iter_mut().for_each(|d| *d *= s);
        self.upper.iter_mut().for_each(|u| *u *= s);
        if let Some(lower) = self.lower.as_mut() {
            lower.iter_mut().for_each(|l| *l *= s);
        }
    }
}

impl Matrix for LduMatrix {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.size(), self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{CyclicLduInterfaceField, LduInterfaceField};

    /// 1D chain with `n` cells, diagonal 2 and off-diagonals -1.
    fn laplacian_chain(n: usize) -> LduMatrix {
        let addressing = LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect(), vec![vec![0], vec![n - 1]]).unwrap();
        LduMatrix::from_coeffs(Arc::new(addressing), vec![2.0; n], vec![-1.0; n - 1], None).unwrap()
    }

    #[test]
    fn test_amul_matches_sparse_product() {
        let mut matrix = laplacian_chain(4);
        matrix.lower_mut()[1] = -3.0;
        let psi = [1.0, 2.0, 3.0, 4.0];
        let mut result = [0.0; 4];
        matrix.amul(&psi, &mut result, &[], &[]).unwrap();
        let expected = matrix.to_sparse().unwrap().mul_vec(&psi).unwrap();
        assert_eq!(result.to_vec(), expected);
        assert_eq!(result, [0.0, 0.0, -4.0, 5.0]);
    }

    #[test]
    fn test_cyclic_interface_closes_the_chain() {
        let matrix = laplacian_chain(3);
        let interfaces: Vec<Option<Box<dyn LduInterfaceField>>> = vec![
            Some(Box::new(CyclicLduInterfaceField::new(vec![0], vec![2]).unwrap())),
            Some(Box::new(CyclicLduInterfaceField::new(vec![2], vec![0]).unwrap())),
        ];
        let coeffs = vec![vec![1.0], vec![1.0]];
        let psi = [1.0; 3];
        let mut result = [0.0; 3];
        matrix.amul(&psi, &mut result, &coeffs, &interfaces).unwrap();
        // periodic Laplacian annihilates constants
        assert_eq!(result, [0.0, 0.0, 0.0]);
        assert_eq!(matrix.sum_a(&coeffs, &interfaces), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tmul_is_transpose() {
        let mut matrix = laplacian_chain(3);
        matrix.lower_mut()[0] = 5.0;
        let psi = [1.0, -1.0, 2.0];
        let mut ax = [0.0; 3];
        let mut atx = [0.0; 3];
        matrix.amul(&psi, &mut ax, &[], &[]).unwrap();
        matrix.tmul(&psi, &mut atx, &[], &[]).unwrap();
        assert_eq!(ax, [3.0, 1.0, 5.0]);
        assert_eq!(atx, [-3.0, -5.0, 5.0]);
    }

    #[test]
    fn test_neg_sum_diag_and_h_op() {
        let mut matrix = laplacian_chain(3);
        matrix.diag_mut().iter_mut().for_each(|d| *d = 0.0);
        matrix.neg_sum_diag();
        assert_eq!(matrix.diag(), &[1.0, 2.0, 1.0]);
        assert_eq!(matrix.h_op(&[1.0, 2.0, 3.0]).unwrap(), vec![2.0, 4.0, 2.0]);
        assert_eq!(matrix.sum_mag_off_diag(), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_scale_rows_splits_symmetric_matrix() {
        let mut matrix = laplacian_chain(2);
        matrix.scale_rows(&[1.0, 3.0]);
        assert!(matrix.asymmetric());
        assert_eq!(matrix.diag(), &[2.0, 6.0]);
        assert_eq!(matrix.upper(), &[-1.0]);
        assert_eq!(matrix.lower(), &[-3.0]);
    }

    #[test]
    fn test_add_mixed_symmetry() {
        let mut a = laplacian_chain(3);
        let mut b = laplacian_chain(3);
        b.lower_mut()[0] = 4.0;
        a += &b;
        assert_eq!(a.upper(), &[-2.0, -2.0]);
        assert_eq!(a.lower(), &[3.0, -2.0]);
        a -= &b;
        assert_eq!(a, {
            let mut c = laplacian_chain(3);
            c.lower_mut();
            c
        });
    }

    #[test]
    fn test_residual() {
        let matrix = laplacian_chain(3);
        let r = matrix.residual(&[1.0, 1.0, 1.0], &[1.0, 0.0, 1.0], &[], &[]).unwrap();
        assert_eq!(r, vec![0.0, 0.0, 0.0]);
    }
}
