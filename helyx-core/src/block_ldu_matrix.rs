//! Block-coupled LDU matrix.
//!
//! Every coefficient slot of a [`BlockLduMatrix`] is optional and carries
//! its own [`CoeffShape`]; an unset slot is zero. When two matrices are
//! combined the narrower slot is widened to the wider one before the
//! arithmetic, never the other way round.

use crate::coeff_field::{CoeffField, CoeffShape};
use crate::error::{HelyxCoreError, Result};
use crate::fatal_error;
use crate::interface::LduInterfaceFieldPtrs;
use crate::ldu_addressing::LduAddressing;
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockLduMatrix<const N: usize> {
    addressing: Arc<LduAddressing>,
    diag: Option<CoeffField<N>>,
    upper: Option<CoeffField<N>>,
    lower: Option<CoeffField<N>>,
    couple_upper: Vec<Option<CoeffField<N>>>,
    couple_lower: Vec<Option<CoeffField<N>>>,
}

/// Accumulates `sign * other` into `target`, allocating the target when it
/// is unset and widening whichever side is narrower.
pub(crate) fn merge_coeffs<const N: usize>(
    target: &mut Option<CoeffField<N>>,
    other: Option<&CoeffField<N>>,
    sign: f64,
) {
    let Some(other) = other else {
        return;
    };
    match target {
        None => {
            let mut copy = other.clone();
            if sign != 1.0 {
                copy *= sign;
            }
            *target = Some(copy);
        }
        Some(existing) => {
            if other.shape() > existing.shape() {
                existing.widen_to(other.shape());
            }
            if existing.shape() > other.shape() {
                let mut widened = other.clone();
                widened.widen_to(existing.shape());
                accumulate(existing, &widened, sign);
            } else {
                accumulate(existing, other, sign);
            }
        }
    }
}

fn accumulate<const N: usize>(target: &mut CoeffField<N>, other: &CoeffField<N>, sign: f64) {
    if sign < 0.0 {
        *target -= other;
    } else {
        *target += other;
    }
}

/// Factor of the owning row of every face: `factors[addr[face]]`.
fn face_factors(factors: &[f64], addr: &[usize]) -> Vec<f64> {
    addr.iter().map(|&cell| factors[cell]).collect()
}

impl<const N: usize> BlockLduMatrix<N> {
    /// An empty matrix; every slot unset.
    pub fn new(addressing: Arc<LduAddressing>) -> Self {
        let n_patches = addressing.n_patches();
        Self {
            addressing,
            diag: None,
            upper: None,
            lower: None,
            couple_upper: vec![None; n_patches],
            couple_lower: vec![None; n_patches],
        }
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn size(&self) -> usize {
        self.addressing.size()
    }

    pub fn n_patches(&self) -> usize {
        self.addressing.n_patches()
    }

    pub fn diag(&self) -> Option<&CoeffField<N>> {
        self.diag.as_ref()
    }

    /// Diagonal, allocated as scalar zeros if unset.
    pub fn diag_mut(&mut self) -> &mut CoeffField<N> {
        let size = self.addressing.size();
        self.diag
            .get_or_insert_with(|| CoeffField::new(CoeffShape::Scalar, size))
    }

    pub fn upper(&self) -> Option<&CoeffField<N>> {
        self.upper.as_ref()
    }

    pub fn upper_mut(&mut self) -> &mut CoeffField<N> {
        let n_faces = self.addressing.n_faces();
        self.upper
            .get_or_insert_with(|| CoeffField::new(CoeffShape::Scalar, n_faces))
    }

    /// Lower coefficients; the upper ones when the matrix is symmetric.
    pub fn lower(&self) -> Option<&CoeffField<N>> {
        self.lower.as_ref().or(self.upper.as_ref())
    }

    /// Lower coefficients, split off from the upper ones on first use.
    pub fn lower_mut(&mut self) -> &mut CoeffField<N> {
        let n_faces = self.addressing.n_faces();
        let upper = &self.upper;
        self.lower.get_or_insert_with(|| {
            upper
                .clone()
                .unwrap_or_else(|| CoeffField::new(CoeffShape::Scalar, n_faces))
        })
    }

    pub fn couple_upper(&self, patch: usize) -> Option<&CoeffField<N>> {
        self.couple_upper[patch].as_ref()
    }

    pub fn couple_upper_mut(&mut self, patch: usize) -> &mut CoeffField<N> {
        let n = self.addressing.patch_addr(patch).len();
        self.couple_upper[patch].get_or_insert_with(|| CoeffField::new(CoeffShape::Scalar, n))
    }

    pub fn couple_lower(&self, patch: usize) -> Option<&CoeffField<N>> {
        self.couple_lower[patch].as_ref()
    }

    pub fn couple_lower_mut(&mut self, patch: usize) -> &mut CoeffField<N> {
        let n = self.addressing.patch_addr(patch).len();
        self.couple_lower[patch].get_or_insert_with(|| CoeffField::new(CoeffShape::Scalar, n))
    }

    pub fn add_to_couple_upper(&mut self, patch: usize, coeffs: &CoeffField<N>) {
        merge_coeffs(&mut self.couple_upper[patch], Some(coeffs), 1.0);
    }

    pub fn add_to_couple_lower(&mut self, patch: usize, coeffs: &CoeffField<N>) {
        merge_coeffs(&mut self.couple_lower[patch], Some(coeffs), 1.0);
    }

    pub fn symmetric(&self) -> bool {
        self.lower.is_none()
    }

    pub fn diagonal(&self) -> bool {
        self.upper.is_none() && self.lower.is_none()
    }

    /// Replaces the off-diagonal coefficients of both triangles.
    pub fn set_off_diagonal(&mut self, upper: CoeffField<N>, lower: Option<CoeffField<N>>) -> Result<()> {
        let n_faces = self.addressing.n_faces();
        if upper.len() != n_faces || lower.as_ref().is_some_and(|l| l.len() != n_faces) {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "off-diagonal coefficients do not match {} faces",
                n_faces
            )));
        }
        self.upper = Some(upper);
        self.lower = lower;
        Ok(())
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut CoeffField<N>> {
        [&mut self.diag, &mut self.upper, &mut self.lower]
            .into_iter()
            .chain(self.couple_upper.iter_mut())
            .chain(self.couple_lower.iter_mut())
            .filter_map(Option::as_mut)
    }

    pub fn negate(&mut self) {
        self.slots_mut().for_each(CoeffField::negate);
    }

    /// Row scaling by a per-cell factor.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        if factors.len() != self.size() {
            fatal_error!(
                "BlockLduMatrix::scale_rows",
                format!("BlockLduMatrix<{}>", N),
                "size mismatch: {} rows, {} factors",
                self.size(),
                factors.len()
            );
        }
        if self.upper.is_some() {
            self.lower_mut();
        }
        let addressing = Arc::clone(&self.addressing);
        if let Some(diag) = self.diag.as_mut() {
            diag.scale_rows(factors);
        }
        if let Some(upper) = self.upper.as_mut() {
            upper.scale_rows(&face_factors(factors, addressing.lower_addr()));
        }
        if let Some(lower) = self.lower.as_mut() {
            lower.scale_rows(&face_factors(factors, addressing.upper_addr()));
        }
        for (patch, coeffs) in self.couple_upper.iter_mut().enumerate() {
            if let Some(coeffs) = coeffs {
                coeffs.scale_rows(&face_factors(factors, addressing.patch_addr(patch)));
            }
        }
    }

    /// `diag -= sum of the column's off-diagonal entries`.
    pub fn neg_sum_diag(&mut self) {
        self.fold_off_diagonal(-1.0);
    }

    /// `diag += sum of the column's off-diagonal entries`.
    pub fn sum_diag(&mut self) {
        self.fold_off_diagonal(1.0);
    }

    fn fold_off_diagonal(&mut self, sign: f64) {
        let (Some(mut upper), Some(mut lower)) = (self.upper.clone(), self.lower().cloned()) else {
            return;
        };
        upper *= sign;
        lower *= sign;
        let addressing = Arc::clone(&self.addressing);
        let l = addressing.lower_addr();
        let u = addressing.upper_addr();
        let diag = self.diag_mut();
        for face in 0..l.len() {
            diag.add_to_row(l[face], &lower, face);
            diag.add_to_row(u[face], &upper, face);
        }
    }

    /// Block product `A psi`. Interface neighbour values are exchanged per
    /// component and multiplied by the coupled upper coefficients.
    pub fn amul(&self, psi: &[[f64; N]], interfaces: &LduInterfaceFieldPtrs) -> Result<Vec<[f64; N]>> {
        if psi.len() != self.size() {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "psi has {} entries for {} rows",
                psi.len(),
                self.size()
            )));
        }
        let mut result = match &self.diag {
            Some(diag) => (0..psi.len()).map(|row| diag.apply(row, &psi[row])).collect(),
            None => vec![[0.0; N]; psi.len()],
        };

        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        if let (Some(upper), Some(lower)) = (self.upper.as_ref(), self.lower()) {
            for face in 0..l.len() {
                let from_lower = lower.apply(face, &psi[l[face]]);
                let from_upper = upper.apply(face, &psi[u[face]]);
                for d in 0..N {
                    result[u[face]][d] += from_lower[d];
                    result[l[face]][d] += from_upper[d];
                }
            }
        }

        for (patch, interface) in interfaces.iter().enumerate() {
            let (Some(interface), Some(coeffs)) = (interface, self.couple_upper.get(patch).and_then(Option::as_ref)) else {
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
                    result[cell][d] -= contribution[d];
                }
            }
        }
        Ok(result)
    }

    fn check_same_addressing(&self, other: &Self, operation: &str) {
        if !Arc::ptr_eq(&self.addressing, &other.addressing) && self.addressing != other.addressing {
            fatal_error!(
                operation,
                format!("BlockLduMatrix<{}>", N),
                "matrices have different addressing"
            );
        }
    }

    fn combine(&mut self, other: &Self, sign: f64) {
        merge_coeffs(&mut self.diag, other.diag.as_ref(), sign);
        if self.lower.is_some() || other.lower.is_some() {
            if self.upper.is_some() || other.upper.is_some() {
                self.lower_mut();
            }
            merge_coeffs(&mut self.lower, other.lower(), sign);
        }
        merge_coeffs(&mut self.upper, other.upper.as_ref(), sign);
        for patch in 0..self.couple_upper.len() {
            merge_coeffs(&mut self.couple_upper[patch], other.couple_upper[patch].as_ref(), sign);
            merge_coeffs(&mut self.couple_lower[patch], other.couple_lower[patch].as_ref(), sign);
        }
    }
}

impl<const N: usize> AddAssign<&BlockLduMatrix<N>> for BlockLduMatrix<N> {
    fn add_assign(&mut self, other: &BlockLduMatrix<N>) {
        self.check_same_addressing(other, "BlockLduMatrix::operator+=");
        self.combine(other, 1.0);
    }
}

impl<const N: usize> SubAssign<&BlockLduMatrix<N>> for BlockLduMatrix<N> {
    fn sub_assign(&mut self, other: &BlockLduMatrix<N>) {
        self.check_same_addressing(other, "BlockLduMatrix::operator-=");
        self.combine(other, -1.0);
    }
}

impl<const N: usize> MulAssign<f64> for BlockLduMatrix<N> {
    fn mul_assign(&mut self, s: f64) {
        self.slots_mut().for_each(|c| *c *= s);
    }
}
