//! Boundary conditions of a volume field.
//!
//! Coefficient conventions: the face value is `vi * psi_P + vb * psi_B`
//! and the face-normal gradient `gi * psi_P + gb * psi_B`, where `psi_B` is
//! the patch value on physical patches and the neighbour value on coupled
//! ones. Boundary coefficients of an `FvMatrix` are therefore multipliers of
//! `psi_B`, never values themselves.

use crate::error::{FvError, Result};
use helyx_core::{FieldValue, fatal_error};
use helyx_lsolver::solver_performance::VSMALL;

/// `s` pushed away from zero by `small`, keeping its sign.
pub fn stabilise(s: f64, small: f64) -> f64 {
    if s >= 0.0 { s + small } else { s - small }
}

/// Data seen across a region-coupled interface, face-matched to the own
/// patch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeighbourSnapshot<T> {
    pub internal: Vec<T>,
    pub ci: Vec<f64>,
    pub cb: Vec<f64>,
    pub flux_corr: Vec<f64>,
    pub q_sum: Vec<f64>,
    pub mag_sf: Vec<f64>,
}

/// Matrix snapshot and interpolation coefficients of a region-coupled flux
/// patch. Before the first coupling the face value is the adjacent cell
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCoupledState<T> {
    pub ci: Vec<f64>,
    pub cb: Vec<f64>,
    pub flux_corr: Vec<f64>,
    /// Interface source per unit area.
    pub q_sum: Vec<f64>,
    pub face_i_coeff: Vec<f64>,
    pub face_b_coeff: Vec<f64>,
    pub face_corr: Vec<f64>,
    pub neighbour: NeighbourSnapshot<T>,
}

impl<T: FieldValue> RegionCoupledState<T> {
    pub fn new(size: usize) -> Self {
        Self {
            ci: vec![0.0; size],
            cb: vec![0.0; size],
            flux_corr: vec![0.0; size],
            q_sum: vec![0.0; size],
            face_i_coeff: vec![1.0; size],
            face_b_coeff: vec![0.0; size],
            face_corr: vec![0.0; size],
            neighbour: NeighbourSnapshot {
                internal: vec![T::zero(); size],
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchFieldKind<T> {
    FixedValue,
    ZeroGradient,
    Calculated,
    Cyclic { neighbour_patch: usize },
    RegionCoupled(Box<RegionCoupledState<T>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchField<T: FieldValue> {
    kind: PatchFieldKind<T>,
    value: Vec<T>,
}

impl<T: FieldValue> PatchField<T> {
    pub fn new(kind: PatchFieldKind<T>, value: Vec<T>) -> Self {
        Self { kind, value }
    }

    pub fn fixed_value(value: Vec<T>) -> Self {
        Self::new(PatchFieldKind::FixedValue, value)
    }

    pub fn zero_gradient(size: usize) -> Self {
        Self::new(PatchFieldKind::ZeroGradient, vec![T::zero(); size])
    }

    pub fn calculated(value: Vec<T>) -> Self {
        Self::new(PatchFieldKind::Calculated, value)
    }

    pub fn cyclic(neighbour_patch: usize, size: usize) -> Self {
        Self::new(PatchFieldKind::Cyclic { neighbour_patch }, vec![T::zero(); size])
    }

    pub fn region_coupled(size: usize) -> Self {
        Self::new(
            PatchFieldKind::RegionCoupled(Box::new(RegionCoupledState::new(size))),
            vec![T::zero(); size],
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            PatchFieldKind::FixedValue => "fixedValue",
            PatchFieldKind::ZeroGradient => "zeroGradient",
            PatchFieldKind::Calculated => "calculated",
            PatchFieldKind::Cyclic { .. } => "cyclic",
            PatchFieldKind::RegionCoupled(_) => "regionCoupledFlux",
        }
    }

    pub fn kind(&self) -> &PatchFieldKind<T> {
        &self.kind
    }

    pub fn size(&self) -> usize {
        self.value.len()
    }

    pub fn value(&self) -> &[T] {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut [T] {
        &mut self.value
    }

    /// Coupled patches do not add their boundary source unless asked to;
    /// region-coupled patches do not report as coupled.
    pub fn coupled(&self) -> bool {
        matches!(self.kind, PatchFieldKind::Cyclic { .. })
    }

    pub fn is_region_coupled(&self) -> bool {
        matches!(self.kind, PatchFieldKind::RegionCoupled(_))
    }

    pub fn fixes_value(&self) -> bool {
        matches!(self.kind, PatchFieldKind::FixedValue)
    }

    pub fn region_coupled_state(&self) -> Option<&RegionCoupledState<T>> {
        match &self.kind {
            PatchFieldKind::RegionCoupled(state) => Some(&**state),
            _ => None,
        }
    }

    pub fn region_coupled_state_mut(&mut self) -> Option<&mut RegionCoupledState<T>> {
        match &mut self.kind {
            PatchFieldKind::RegionCoupled(state) => Some(&mut **state),
            _ => None,
        }
    }

    fn calculated_coefficients(&self, which: &str) -> ! {
        fatal_error!(
            which,
            self.type_name(),
            "cannot be called for a calculated patch field; use a value or gradient condition"
        )
    }

    pub fn value_internal_coeffs(&self, weights: &[f64]) -> Vec<T> {
        match &self.kind {
            PatchFieldKind::FixedValue | PatchFieldKind::RegionCoupled(_) => vec![T::zero(); self.size()],
            PatchFieldKind::ZeroGradient => vec![T::uniform(1.0); self.size()],
            PatchFieldKind::Cyclic { .. } => weights.iter().map(|&w| T::uniform(w)).collect(),
            PatchFieldKind::Calculated => self.calculated_coefficients("valueInternalCoeffs"),
        }
    }

    pub fn value_boundary_coeffs(&self, weights: &[f64]) -> Vec<T> {
        match &self.kind {
            PatchFieldKind::FixedValue | PatchFieldKind::RegionCoupled(_) => vec![T::uniform(1.0); self.size()],
            PatchFieldKind::ZeroGradient => vec![T::zero(); self.size()],
            PatchFieldKind::Cyclic { .. } => weights.iter().map(|&w| T::uniform(1.0 - w)).collect(),
            PatchFieldKind::Calculated => self.calculated_coefficients("valueBoundaryCoeffs"),
        }
    }

    pub fn gradient_internal_coeffs(&self, delta_coeffs: &[f64]) -> Vec<T> {
        match &self.kind {
            PatchFieldKind::ZeroGradient => vec![T::zero(); self.size()],
            PatchFieldKind::Calculated => self.calculated_coefficients("gradientInternalCoeffs"),
            _ => delta_coeffs.iter().map(|&d| T::uniform(-d)).collect(),
        }
    }

    pub fn gradient_boundary_coeffs(&self, delta_coeffs: &[f64]) -> Vec<T> {
        match &self.kind {
            PatchFieldKind::ZeroGradient => vec![T::zero(); self.size()],
            PatchFieldKind::Calculated => self.calculated_coefficients("gradientBoundaryCoeffs"),
            _ => delta_coeffs.iter().map(|&d| T::uniform(d)).collect(),
        }
    }

    /// Stores the matrix coefficients of a region-coupled patch so that both
    /// sides of the interface can build their coupled coefficients.
    pub fn manipulate_matrix(&mut self, internal_coeffs: &[T], boundary_coeffs: &[T], flux_corr: Option<&[T]>) {
        let Some(state) = self.region_coupled_state_mut() else {
            return;
        };
        state.cb = boundary_coeffs.iter().map(|c| stabilise(c.cmpt_av(), VSMALL)).collect();
        state.ci = internal_coeffs.iter().map(FieldValue::cmpt_av).collect();
        state.flux_corr = match flux_corr {
            Some(corr) => corr.iter().map(FieldValue::cmpt_av).collect(),
            None => vec![0.0; state.ci.len()],
        };
    }

    /// Coefficients of the boundary flux of a region-coupled patch as a
    /// function of the own and neighbour cell values, from a face value
    /// `faceICoeff*psi_P + faceBCoeff*psi_N + faceCorr` that balances the
    /// fluxes of both sides.
    ///
    /// Returns `(intCoeffs - bouCoeffs*faceICoeff, bouCoeffs*faceBCoeff,
    /// faceCorr)`.
    pub fn region_coupled_boundary_coeffs(
        &mut self,
        boundary_coeffs: &[f64],
        internal_coeffs: &[f64],
        mag_sf: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let type_name = self.type_name();
        let Some(state) = self.region_coupled_state_mut() else {
            return Err(FvError::FieldError(format!(
                "regionCoupledBoundaryCoeffs called on a {} patch",
                type_name
            )));
        };
        let n = state.ci.len();
        let nbr = &state.neighbour;
        if [nbr.ci.len(), nbr.cb.len(), nbr.flux_corr.len(), nbr.q_sum.len(), nbr.mag_sf.len()]
            .iter()
            .chain([boundary_coeffs.len(), internal_coeffs.len(), mag_sf.len()].iter())
            .any(|&len| len != n)
        {
            return Err(FvError::FieldError(format!(
                "region-coupled patch of {} faces has no matching neighbour snapshot",
                n
            )));
        }

        let mut coupled_int = Vec::with_capacity(n);
        let mut coupled_bou = Vec::with_capacity(n);
        for face in 0..n {
            let (ci, cb) = (state.ci[face], state.cb[face]);
            // neighbour coefficients rescaled to the own face area
            let area_ratio = mag_sf[face] / nbr.mag_sf[face];
            let (ci_nbr, cb_nbr) = (nbr.ci[face] * area_ratio, nbr.cb[face] * area_ratio);
            let flux_corr_nbr = nbr.flux_corr[face] * area_ratio;

            let weight = cb / (cb + cb_nbr);
            state.face_i_coeff[face] = ci / cb * weight;
            state.face_b_coeff[face] = ci_nbr / cb_nbr * (1.0 - weight);
            state.face_corr[face] = (state.flux_corr[face] + state.q_sum[face] * mag_sf[face]) / cb * weight
                + (flux_corr_nbr + nbr.q_sum[face] * mag_sf[face]) / cb_nbr * (1.0 - weight);

            coupled_int.push(internal_coeffs[face] - boundary_coeffs[face] * state.face_i_coeff[face]);
            coupled_bou.push(boundary_coeffs[face] * state.face_b_coeff[face]);
        }
        Ok((coupled_int, coupled_bou, state.face_corr.clone()))
    }

    /// Re-evaluates the patch value from the adjacent cell values and, on
    /// coupled patches, the values across the interface.
    pub fn evaluate(&mut self, patch_internal: &[T], patch_neighbour: Option<&[T]>, weights: &[f64]) {
        match &self.kind {
            PatchFieldKind::FixedValue | PatchFieldKind::Calculated => {}
            PatchFieldKind::ZeroGradient => self.value.copy_from_slice(patch_internal),
            PatchFieldKind::Cyclic { .. } => {
                if let Some(nbr) = patch_neighbour {
                    for (face, value) in self.value.iter_mut().enumerate() {
                        let w = weights[face];
                        *value = patch_internal[face].scale(w).add(nbr[face].scale(1.0 - w));
                    }
                }
            }
            PatchFieldKind::RegionCoupled(state) => {
                for (face, value) in self.value.iter_mut().enumerate() {
                    let across = state.neighbour.internal.get(face).copied().unwrap_or_else(T::zero);
                    *value = patch_internal[face]
                        .scale(state.face_i_coeff[face])
                        .add(across.scale(state.face_b_coeff[face]))
                        .add(T::uniform(state.face_corr[face]));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupled_pair(g_own: f64, g_nbr: f64) -> PatchField<f64> {
        let mut patch = PatchField::<f64>::region_coupled(1);
        patch.manipulate_matrix(&[-g_own], &[-g_own], None);
        let state = patch.region_coupled_state_mut().unwrap();
        state.neighbour = NeighbourSnapshot {
            internal: vec![0.0],
            ci: vec![-g_nbr],
            cb: vec![-g_nbr],
            flux_corr: vec![0.0],
            q_sum: vec![0.0],
            mag_sf: vec![1.0],
        };
        patch
    }

    #[test]
    fn test_region_coupled_weights_balance_conductances() {
        let mut patch = coupled_pair(4.0, 1.0);
        let (psic, psbc, corr) = patch.region_coupled_boundary_coeffs(&[-4.0], &[-4.0], &[1.0]).unwrap();
        let state = patch.region_coupled_state().unwrap();
        assert!((state.face_i_coeff[0] - 0.8).abs() < 1e-12);
        assert!((state.face_b_coeff[0] - 0.2).abs() < 1e-12);
        // harmonic conductance 4*1/(4+1)
        assert!((psic[0] + 0.8).abs() < 1e-12);
        assert!((psbc[0] + 0.8).abs() < 1e-12);
        assert_eq!(corr, vec![0.0]);
    }

    #[test]
    fn test_region_coupled_evaluate_interpolates() {
        let mut patch = coupled_pair(1.0, 1.0);
        patch.region_coupled_boundary_coeffs(&[-1.0], &[-1.0], &[1.0]).unwrap();
        patch.region_coupled_state_mut().unwrap().neighbour.internal = vec![10.0];
        patch.evaluate(&[2.0], None, &[0.5]);
        assert!((patch.value()[0] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_value_coefficients() {
        let patch = PatchField::<[f64; 3]>::fixed_value(vec![[1.0, 2.0, 3.0]]);
        assert_eq!(patch.value_internal_coeffs(&[0.5]), vec![[0.0; 3]]);
        assert_eq!(patch.gradient_internal_coeffs(&[4.0]), vec![[-4.0; 3]]);
        assert_eq!(patch.gradient_boundary_coeffs(&[4.0]), vec![[4.0; 3]]);
        assert!(!patch.coupled());
    }

    #[test]
    #[should_panic(expected = "calculated patch field")]
    fn test_calculated_has_no_coefficients() {
        PatchField::<f64>::calculated(vec![0.0]).value_internal_coeffs(&[1.0]);
    }

    #[test]
    fn test_stabilise_keeps_sign() {
        assert!(stabilise(-1.0, 0.5) < -1.0);
        assert!(stabilise(0.0, 0.5) > 0.0);
    }
}
