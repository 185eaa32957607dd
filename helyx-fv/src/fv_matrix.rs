//! Finite-volume matrix of one field: an [`LduMatrix`] with a source and
//! per-patch boundary coefficients.
//!
//! The equation is `A psi = source`. Boundary contributions are kept out of
//! the LDU matrix: `internal_coeffs` add to the diagonal of the face cells
//! and `boundary_coeffs` multiply the patch value (or, on coupled patches,
//! the value across the interface) into the source. They are only folded in
//! for the duration of a solve.

use crate::error::{FvError, Result};
use crate::fv_mesh::FvMesh;
use crate::vol_field::{SurfaceField, VolField};
use helyx_core::field::{component, replace_component};
use helyx_core::{DimensionSet, FieldValue, GlobalReduce, LduInterfaceField, LduMatrix, SerialCommunicator, fatal_error};
use helyx_lsolver::{SolverControls, SolverInputs, SolverPerformance, new_solver};
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::sync::Arc;

/// Suffixes appended to the field name for each solved component.
pub fn component_names<T: FieldValue>() -> &'static [&'static str] {
    match T::TYPE_NAME {
        "vector" => &["x", "y", "z"],
        "sphericalTensor" => &["ii"],
        "symmTensor" => &["xx", "xy", "xz", "yy", "yz", "zz"],
        "tensor" => &["xx", "xy", "xz", "yx", "yy", "yz", "zx", "zy", "zz"],
        _ => &[""],
    }
}

#[derive(Debug, Clone)]
pub struct FvMatrix<T: FieldValue> {
    psi_name: String,
    mesh: Arc<FvMesh>,
    dimensions: DimensionSet,
    ldu: LduMatrix,
    source: Vec<T>,
    psi_values: Vec<T>,
    internal_coeffs: Vec<Vec<T>>,
    boundary_coeffs: Vec<Vec<T>>,
    face_flux_correction: Option<SurfaceField<T>>,
}

impl<T: FieldValue> FvMatrix<T> {
    /// An empty matrix for `psi`. `dimensions` are those of the equation
    /// integrated over the cell volume.
    pub fn new(psi: &VolField<T>, dimensions: DimensionSet) -> Self {
        let mesh = Arc::clone(psi.mesh());
        let zeros = |p: &crate::fv_mesh::FvPatch| vec![T::zero(); p.size()];
        Self {
            psi_name: psi.name().to_string(),
            ldu: LduMatrix::new(Arc::clone(mesh.addressing())),
            source: vec![T::zero(); mesh.n_cells()],
            psi_values: psi.internal().to_vec(),
            internal_coeffs: mesh.patches().iter().map(zeros).collect(),
            boundary_coeffs: mesh.patches().iter().map(zeros).collect(),
            face_flux_correction: None,
            dimensions,
            mesh,
        }
    }

    pub fn psi_name(&self) -> &str {
        &self.psi_name
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    pub fn ldu(&self) -> &LduMatrix {
        &self.ldu
    }

    pub fn ldu_mut(&mut self) -> &mut LduMatrix {
        &mut self.ldu
    }

    pub fn diag(&self) -> &[f64] {
        self.ldu.diag()
    }

    pub fn source(&self) -> &[T] {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut [T] {
        &mut self.source
    }

    /// Cell values of psi when the matrix was built, used by sources that
    /// are explicit in psi.
    pub fn psi_values(&self) -> &[T] {
        &self.psi_values
    }

    pub fn internal_coeffs(&self) -> &[Vec<T>] {
        &self.internal_coeffs
    }

    pub fn internal_coeffs_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.internal_coeffs
    }

    pub fn boundary_coeffs(&self) -> &[Vec<T>] {
        &self.boundary_coeffs
    }

    pub fn boundary_coeffs_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.boundary_coeffs
    }

    pub fn face_flux_correction(&self) -> Option<&SurfaceField<T>> {
        self.face_flux_correction.as_ref()
    }

    pub fn set_face_flux_correction(&mut self, correction: SurfaceField<T>) {
        self.face_flux_correction = Some(correction);
    }

    fn object(&self) -> String {
        format!("fvMatrix({})", self.psi_name)
    }

    fn check_compatible(&self, other: &FvMatrix<T>, operation: &str) {
        if self.psi_name != other.psi_name || self.mesh.name() != other.mesh.name() {
            fatal_error!(
                operation,
                self.object(),
                "incompatible fields for operation: {} on {} and {} on {}",
                self.psi_name,
                self.mesh.name(),
                other.psi_name,
                other.mesh.name()
            );
        }
        if self.dimensions != other.dimensions {
            fatal_error!(
                operation,
                self.object(),
                "Inconsistent dimensions {} and {}",
                self.dimensions,
                other.dimensions
            );
        }
    }

    fn check_psi(&self, psi: &VolField<T>, operation: &str) -> Result<()> {
        if psi.name() != self.psi_name || psi.mesh().name() != self.mesh.name() {
            return Err(FvError::FieldError(format!(
                "{}: matrix of {} on {} given field {} on {}",
                operation,
                self.psi_name,
                self.mesh.name(),
                psi.name(),
                psi.mesh().name()
            )));
        }
        Ok(())
    }

    pub fn negate(&mut self) {
        self.ldu.negate();
        negate_values(&mut self.source);
        self.internal_coeffs.iter_mut().for_each(|c| negate_values(c));
        self.boundary_coeffs.iter_mut().for_each(|c| negate_values(c));
        if let Some(correction) = self.face_flux_correction.as_mut() {
            correction.map_values(T::neg);
        }
    }

    /// Multiplies every row by a cell factor, boundary coefficients by the
    /// factor of their face cell. A matrix with a face-flux correction
    /// cannot be scaled.
    pub fn scale_rows(&mut self, factors: &VolField<f64>) {
        if self.face_flux_correction.is_some() {
            fatal_error!(
                "fvMatrix::operator*=(volScalarField)",
                self.object(),
                "cannot scale a matrix containing a faceFluxCorrection"
            );
        }
        let f = factors.internal();
        self.dimensions = self.dimensions * *factors.dimensions();
        self.ldu.scale_rows(f);
        for (value, s) in self.source.iter_mut().zip(f) {
            *value = value.scale(*s);
        }
        for (p, patch) in self.mesh.patches().iter().enumerate() {
            for (face, &cell) in patch.face_cells.iter().enumerate() {
                self.internal_coeffs[p][face] = self.internal_coeffs[p][face].scale(f[cell]);
                self.boundary_coeffs[p][face] = self.boundary_coeffs[p][face].scale(f[cell]);
            }
        }
    }

    /// Implicit source `sp*psi`.
    pub fn add_sp(&mut self, sp: &[f64]) {
        let volumes = self.mesh.volumes();
        for ((d, s), v) in self.ldu.diag_mut().iter_mut().zip(sp).zip(volumes) {
            *d += v * s;
        }
    }

    /// Explicit source `su`.
    pub fn add_su(&mut self, su: &[T]) {
        let volumes = self.mesh.volumes();
        for ((b, s), v) in self.source.iter_mut().zip(su).zip(volumes) {
            *b = b.sub(s.scale(*v));
        }
    }

    /// Source `susp*psi`, implicit where `susp` is positive and explicit
    /// otherwise.
    pub fn add_su_sp(&mut self, susp: &[f64], psi: &[T]) {
        let volumes = self.mesh.volumes().to_vec();
        let diag = self.ldu.diag_mut();
        for (cell, &s) in susp.iter().enumerate() {
            diag[cell] += volumes[cell] * s.max(0.0);
            self.source[cell] = self.source[cell].sub(psi[cell].scale(volumes[cell] * s.min(0.0)));
        }
    }

    /// Fixes `psi` to `values` in `cells`: the rows become `diag*psi =
    /// diag*value` and the couplings to the other cells move to their
    /// sources.
    pub fn set_values(&mut self, psi: &mut VolField<T>, cells: &[usize], values: &[T]) {
        if cells.len() != values.len() {
            fatal_error!(
                "fvMatrix::setValues",
                self.object(),
                "{} cells given {} values",
                cells.len(),
                values.len()
            );
        }
        let mesh = Arc::clone(&self.mesh);
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        let symmetric = self.ldu.symmetric();
        for (&cell, &value) in cells.iter().zip(values) {
            psi.internal_mut()[cell] = value;
            self.psi_values[cell] = value;
            self.source[cell] = value.scale(self.ldu.diag()[cell]);

            for face in mesh.cell_faces(cell) {
                let (own, nei) = (owner[face], neighbour[face]);
                let upper = self.ldu.upper()[face];
                if symmetric {
                    let other = if cell == own { nei } else { own };
                    self.source[other] = self.source[other].sub(value.scale(upper));
                } else if cell == own {
                    let lower = self.ldu.lower()[face];
                    self.source[nei] = self.source[nei].sub(value.scale(lower));
                } else {
                    self.source[own] = self.source[own].sub(value.scale(upper));
                }
                self.ldu.upper_mut()[face] = 0.0;
                if !symmetric {
                    self.ldu.lower_mut()[face] = 0.0;
                }
            }

            for (patch, face) in mesh.cell_boundary_faces(cell) {
                self.internal_coeffs[patch][face] = T::zero();
                self.boundary_coeffs[patch][face] = T::zero();
            }
        }
    }

    /// Pins the level of a matrix without a fixed-value boundary.
    pub fn set_reference(&mut self, cell: usize, value: T) {
        let d = self.ldu.diag()[cell];
        self.source[cell] = self.source[cell].add(value.scale(d));
        self.ldu.diag_mut()[cell] += d;
    }

    /// Lets the boundary conditions see the matrix coefficients.
    pub fn boundary_manipulate(&self, psi: &mut VolField<T>) {
        for (p, patch_field) in psi.boundary_mut().iter_mut().enumerate() {
            let flux_corr = self.face_flux_correction.as_ref().map(|c| c.boundary[p].as_slice());
            patch_field.manipulate_matrix(&self.internal_coeffs[p], &self.boundary_coeffs[p], flux_corr);
        }
    }

    pub fn add_boundary_diag(&self, diag: &mut [f64], cmpt: usize) {
        for (patch, coeffs) in self.mesh.patches().iter().zip(&self.internal_coeffs) {
            for (&cell, c) in patch.face_cells.iter().zip(coeffs) {
                diag[cell] += c.component(cmpt);
            }
        }
    }

    pub fn add_cmpt_avg_boundary_diag(&self, diag: &mut [f64]) {
        for (patch, coeffs) in self.mesh.patches().iter().zip(&self.internal_coeffs) {
            for (&cell, c) in patch.face_cells.iter().zip(coeffs) {
                diag[cell] += c.cmpt_av();
            }
        }
    }

    /// Adds `boundary_coeffs*psi_B` to `source`. Coupled patches contribute
    /// their neighbour values only when `couples` is set; region-coupled
    /// patches are not coupled in this sense and use their patch value.
    pub fn add_boundary_source(&self, source: &mut [T], psi: &VolField<T>, couples: bool) {
        for (p, patch) in self.mesh.patches().iter().enumerate() {
            let patch_field = &psi.boundary()[p];
            let coeffs = &self.boundary_coeffs[p];
            if patch_field.coupled() {
                if !couples {
                    continue;
                }
                if let Some(pnf) = psi.patch_neighbour_field(p) {
                    for ((&cell, c), v) in patch.face_cells.iter().zip(coeffs).zip(&pnf) {
                        source[cell] = source[cell].add(c.cmpt_multiply(*v));
                    }
                }
            } else {
                for ((&cell, c), v) in patch.face_cells.iter().zip(coeffs).zip(patch_field.value()) {
                    source[cell] = source[cell].add(c.cmpt_multiply(*v));
                }
            }
        }
    }

    fn component_coeffs(coeffs: &[Vec<T>], cmpt: usize) -> Vec<Vec<f64>> {
        coeffs.iter().map(|c| component(c, cmpt)).collect()
    }

    /// Solves each component of `psi` in turn with the boundary
    /// contributions folded in. The diagonal is restored afterwards, also
    /// when a solve fails.
    pub fn solve_segregated(
        &mut self,
        psi: &mut VolField<T>,
        controls: &SolverControls,
        reduce: &dyn GlobalReduce,
    ) -> Result<SolverPerformance> {
        self.check_psi(psi, "fvMatrix::solveSegregated")?;
        log::debug!(
            "fvMatrix::solveSegregated : solving fvMatrix<{}> for {}",
            T::TYPE_NAME,
            psi.name()
        );

        let saved_diag = self.ldu.diag().to_vec();
        self.boundary_manipulate(psi);
        let mut total_source = self.source.clone();
        self.add_boundary_source(&mut total_source, psi, false);

        let result = self.solve_components(psi, &saved_diag, &total_source, controls, reduce);
        *self.ldu.diag_mut() = saved_diag;
        let perf = result?;

        psi.correct_boundary_conditions();
        self.mesh.set_solver_performance(psi.name(), perf.clone());
        Ok(perf)
    }

    fn solve_components(
        &mut self,
        psi: &mut VolField<T>,
        saved_diag: &[f64],
        total_source: &[T],
        controls: &SolverControls,
        reduce: &dyn GlobalReduce,
    ) -> Result<SolverPerformance> {
        let interfaces: Vec<Option<Box<dyn LduInterfaceField>>> = psi.scalar_interfaces()?;
        let names = component_names::<T>();
        let mut combined: Option<SolverPerformance> = None;

        for cmpt in 0..T::N_COMPONENTS {
            let mut diag = saved_diag.to_vec();
            self.add_boundary_diag(&mut diag, cmpt);
            *self.ldu.diag_mut() = diag;

            let mut psi_cmpt = component(psi.internal(), cmpt);
            let source_cmpt = component(total_source, cmpt);
            let bou_coeffs = Self::component_coeffs(&self.boundary_coeffs, cmpt);
            let int_coeffs = Self::component_coeffs(&self.internal_coeffs, cmpt);
            let field_name = format!("{}{}", psi.name(), names.get(cmpt).copied().unwrap_or(""));

            let inputs = SolverInputs {
                field_name: &field_name,
                matrix: &self.ldu,
                interface_bou_coeffs: &bou_coeffs,
                interface_int_coeffs: &int_coeffs,
                interfaces: &interfaces,
                reduce,
            };
            let perf = new_solver(inputs, controls)?.solve(&mut psi_cmpt, &source_cmpt)?;
            replace_component(psi.internal_mut(), cmpt, &psi_cmpt);

            combined = Some(match combined {
                Some(previous) => previous.max(perf),
                None => perf,
            });
        }
        Ok(combined.unwrap_or_else(|| SolverPerformance::new(controls.solver.as_str(), psi.name())))
    }

    /// Serial segregated solve.
    pub fn solve(&mut self, psi: &mut VolField<T>, controls: &SolverControls) -> Result<SolverPerformance> {
        self.solve_segregated(psi, controls, &SerialCommunicator::new())
    }

    /// `source + boundary source - A psi` with the boundary diagonal
    /// included. Only uncoupled boundary sources enter explicitly; coupled
    /// ones go through the interfaces.
    pub fn residual(&self, psi: &VolField<T>) -> Result<Vec<T>> {
        self.check_psi(psi, "fvMatrix::residual")?;
        let interfaces = psi.scalar_interfaces()?;
        let mut residual = vec![T::zero(); self.source.len()];

        for cmpt in 0..T::N_COMPONENTS {
            let psi_cmpt = component(psi.internal(), cmpt);
            let mut boundary_diag = vec![0.0; psi_cmpt.len()];
            self.add_boundary_diag(&mut boundary_diag, cmpt);
            let source_cmpt: Vec<f64> = component(&self.source, cmpt)
                .iter()
                .zip(&boundary_diag)
                .zip(&psi_cmpt)
                .map(|((b, d), p)| b - d * p)
                .collect();
            let bou_coeffs = Self::component_coeffs(&self.boundary_coeffs, cmpt);
            let residual_cmpt = self.ldu.residual(&psi_cmpt, &source_cmpt, &bou_coeffs, &interfaces)?;
            replace_component(&mut residual, cmpt, &residual_cmpt);
        }
        self.add_boundary_source(&mut residual, psi, false);
        Ok(residual)
    }

    /// Central coefficients per unit volume, with the component-averaged
    /// boundary diagonal.
    pub fn a(&self) -> Vec<f64> {
        let mut diag = self.ldu.diag().to_vec();
        self.add_cmpt_avg_boundary_diag(&mut diag);
        diag.iter().zip(self.mesh.volumes()).map(|(d, v)| d / v).collect()
    }

    /// Off-diagonal part applied to `psi` plus the sources, per unit volume:
    /// `A psi = H` at convergence, with `A` from [`FvMatrix::a`].
    pub fn h(&self, psi: &VolField<T>) -> Result<Vec<T>> {
        self.check_psi(psi, "fvMatrix::H")?;
        let mut h = vec![T::zero(); self.source.len()];

        let mut avg_boundary_diag = vec![0.0; h.len()];
        self.add_cmpt_avg_boundary_diag(&mut avg_boundary_diag);
        for cmpt in 0..T::N_COMPONENTS {
            let psi_cmpt = component(psi.internal(), cmpt);
            let mut boundary_diag = vec![0.0; h.len()];
            self.add_boundary_diag(&mut boundary_diag, cmpt);
            let mut h_cmpt = self.ldu.h_op(&psi_cmpt)?;
            for cell in 0..h_cmpt.len() {
                h_cmpt[cell] += (avg_boundary_diag[cell] - boundary_diag[cell]) * psi_cmpt[cell];
            }
            replace_component(&mut h, cmpt, &h_cmpt);
        }

        for (value, b) in h.iter_mut().zip(&self.source) {
            *value = value.add(*b);
        }
        self.add_boundary_source(&mut h, psi, true);
        for (value, v) in h.iter_mut().zip(self.mesh.volumes()) {
            *value = value.scale(1.0 / v);
        }
        Ok(h)
    }
}

fn negate_values<T: FieldValue>(values: &mut [T]) {
    values.iter_mut().for_each(|v| *v = v.neg());
}

fn accumulate<T: FieldValue>(target: &mut [T], other: &[T], sign: f64) {
    for (a, b) in target.iter_mut().zip(other) {
        *a = a.add(b.scale(sign));
    }
}

impl<T: FieldValue> FvMatrix<T> {
    fn accumulate_matrix(&mut self, other: &FvMatrix<T>, sign: f64) {
        accumulate(&mut self.source, &other.source, sign);
        for (a, b) in self.internal_coeffs.iter_mut().zip(&other.internal_coeffs) {
            accumulate(a, b, sign);
        }
        for (a, b) in self.boundary_coeffs.iter_mut().zip(&other.boundary_coeffs) {
            accumulate(a, b, sign);
        }
        match (self.face_flux_correction.as_mut(), other.face_flux_correction.as_ref()) {
            (Some(a), Some(b)) => a.zip_apply(b, |x, y| x.add(y.scale(sign))),
            (None, Some(b)) => {
                let mut correction = b.clone();
                correction.map_values(|x| x.scale(sign));
                self.face_flux_correction = Some(correction);
            }
            _ => {}
        }
    }
}

impl<T: FieldValue> AddAssign<&FvMatrix<T>> for FvMatrix<T> {
    fn add_assign(&mut self, other: &FvMatrix<T>) {
        self.check_compatible(other, "fvMatrix::operator+=");
        self.ldu += &other.ldu;
        self.accumulate_matrix(other, 1.0);
    }
}

impl<T: FieldValue> SubAssign<&FvMatrix<T>> for FvMatrix<T> {
    fn sub_assign(&mut self, other: &FvMatrix<T>) {
        self.check_compatible(other, "fvMatrix::operator-=");
        self.ldu -= &other.ldu;
        self.accumulate_matrix(other, -1.0);
    }
}

impl<T: FieldValue> MulAssign<f64> for FvMatrix<T> {
    fn mul_assign(&mut self, s: f64) {
        self.ldu *= s;
        self.source.iter_mut().for_each(|v| *v = v.scale(s));
        for coeffs in self.internal_coeffs.iter_mut().chain(self.boundary_coeffs.iter_mut()) {
            coeffs.iter_mut().for_each(|v| *v = v.scale(s));
        }
        if let Some(correction) = self.face_flux_correction.as_mut() {
            correction.map_values(|v| v.scale(s));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fvm;

    fn rod(n: usize) -> Arc<FvMesh> {
        Arc::new(FvMesh::one_dimensional("rod", n, 1.0, 1.0).unwrap())
    }

    #[test]
    fn test_component_names() {
        assert_eq!(component_names::<f64>(), &[""]);
        assert_eq!(component_names::<[f64; 3]>(), &["x", "y", "z"]);
        assert_eq!(component_names::<[f64; 6]>().len(), 6);
    }

    #[test]
    fn test_boundary_source_skips_coupled_patches() {
        let mesh = Arc::new(
            FvMesh::one_dimensional("ring", 4, 1.0, 1.0)
                .unwrap()
                .couple_cyclic("left", "right")
                .unwrap(),
        );
        let mut t = VolField::uniform("T", mesh, DimensionSet::temperature(), 0.0);
        t.internal_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        t.correct_boundary_conditions();
        let m = fvm::laplacian(fvm::Dimensioned::dimensionless(1.0), &t);

        let mut uncoupled = vec![0.0; 4];
        m.add_boundary_source(&mut uncoupled, &t, false);
        assert_eq!(uncoupled, vec![0.0; 4]);

        let mut coupled = vec![0.0; 4];
        m.add_boundary_source(&mut coupled, &t, true);
        // left face of cell 0 sees cell 3 across the cyclic
        assert!(coupled[0] < 0.0);
        assert!((coupled[0] + m.boundary_coeffs()[0][0].abs() * 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_set_reference_doubles_diagonal() {
        let t = VolField::uniform("p", rod(3), DimensionSet::pressure(), 0.0);
        let mut m = fvm::laplacian(fvm::Dimensioned::dimensionless(1.0), &t);
        let d = m.diag()[0];
        m.set_reference(0, 2.0);
        assert_eq!(m.diag()[0], 2.0 * d);
        assert_eq!(m.source()[0], 2.0 * d);
    }

    #[test]
    #[should_panic(expected = "faceFluxCorrection")]
    fn test_scaling_with_face_flux_correction_is_fatal() {
        let mesh = rod(2);
        let t = VolField::uniform("T", mesh.clone(), DimensionSet::temperature(), 0.0);
        let mut m = FvMatrix::new(&t, DimensionSet::temperature());
        m.set_face_flux_correction(SurfaceField::uniform(&mesh, 0.0));
        let factors = VolField::uniform("alpha", mesh, DimensionSet::dimensionless(), 0.5);
        m.scale_rows(&factors);
    }

    #[test]
    fn test_a_includes_boundary_diagonal() {
        let mut t = VolField::uniform("T", rod(2), DimensionSet::temperature(), 0.0);
        t.set_fixed_value("left", 1.0).unwrap();
        let m = fvm::laplacian(fvm::Dimensioned::dimensionless(1.0), &t);
        // dx = 0.5: internal G = 2, boundary G = 4
        let a = m.a();
        assert!((a[0] - (-6.0 / 0.5)).abs() < 1e-12);
        assert!((a[1] - (-2.0 / 0.5)).abs() < 1e-12);
    }
}
