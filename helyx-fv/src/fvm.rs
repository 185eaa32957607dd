//! Implicit operators building an [`FvMatrix`] for a field.

use crate::fv_matrix::FvMatrix;
use crate::vol_field::VolField;
use helyx_core::{DimensionSet, FieldValue};

/// A uniform coefficient with its units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensioned {
    pub value: f64,
    pub dimensions: DimensionSet,
}

impl Dimensioned {
    pub fn new(value: f64, dimensions: DimensionSet) -> Self {
        Self { value, dimensions }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, DimensionSet::dimensionless())
    }
}

const LENGTH: DimensionSet = DimensionSet::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0);

/// `laplacian(gamma, psi)` with uncorrected face-normal gradients.
pub fn laplacian<T: FieldValue>(gamma: Dimensioned, psi: &VolField<T>) -> FvMatrix<T> {
    let mesh = psi.mesh().clone();
    let mut m = FvMatrix::new(psi, gamma.dimensions * *psi.dimensions() * LENGTH);

    {
        let upper = m.ldu_mut().upper_mut();
        for (face, coeff) in upper.iter_mut().enumerate() {
            *coeff = gamma.value * mesh.mag_sf()[face] * mesh.delta_coeffs()[face];
        }
    }
    m.ldu_mut().neg_sum_diag();

    for (p, patch) in mesh.patches().iter().enumerate() {
        let patch_field = &psi.boundary()[p];
        let gamma_mag_sf: Vec<f64> = patch.mag_sf.iter().map(|s| gamma.value * s).collect();
        let gi = patch_field.gradient_internal_coeffs(&patch.delta_coeffs);
        let gb = patch_field.gradient_boundary_coeffs(&patch.delta_coeffs);
        m.internal_coeffs_mut()[p] = gi.iter().zip(&gamma_mag_sf).map(|(c, g)| c.scale(*g)).collect();
        m.boundary_coeffs_mut()[p] = gb.iter().zip(&gamma_mag_sf).map(|(c, g)| c.scale(-*g)).collect();
    }
    m
}

/// Implicit source `sp*psi`.
pub fn sp<T: FieldValue>(coeff: &VolField<f64>, psi: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(psi, *coeff.dimensions() * *psi.dimensions() * DimensionSet::volume());
    m.add_sp(coeff.internal());
    m
}

pub fn sp_uniform<T: FieldValue>(coeff: Dimensioned, psi: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(psi, coeff.dimensions * *psi.dimensions() * DimensionSet::volume());
    m.add_sp(&vec![coeff.value; psi.size()]);
    m
}

/// Explicit source `su`.
pub fn su<T: FieldValue>(source: &VolField<T>, psi: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(psi, *source.dimensions() * DimensionSet::volume());
    m.add_su(source.internal());
    m
}

/// Implicit where `coeff > 0`, explicit elsewhere.
pub fn su_sp<T: FieldValue>(coeff: &VolField<f64>, psi: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(psi, *coeff.dimensions() * *psi.dimensions() * DimensionSet::volume());
    m.add_su_sp(coeff.internal(), psi.internal());
    m
}
