//! Block linear system: a [`BlockLduMatrix`] with its source, per-patch
//! internal/boundary coefficients, an optional face-flux correction and the
//! physical dimensions of each solved component.
//!
//! Unset patch entries are zero. `+=` and `-=` merge them as a sparse union:
//! an entry only present on the right is allocated on the left.

use crate::block_ldu_matrix::{merge_coeffs, BlockLduMatrix};
use crate::coeff_field::{CoeffField, CoeffShape};
use crate::dimension_set::DimensionSet;
use crate::error::{HelyxCoreError, Result};
use crate::fatal_error;
use crate::field::{dot, FieldValue, Vector};
use crate::interface::LduInterfaceFieldPtrs;
use crate::ldu_addressing::LduAddressing;
use std::cell::RefCell;
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockLduSystem<const N: usize, S: FieldValue> {
    name: String,
    matrix: BlockLduMatrix<N>,
    source: Vec<S>,
    internal_coeffs: Vec<Option<CoeffField<N>>>,
    boundary_coeffs: Vec<Option<Vec<S>>>,
    face_flux_correction: Option<Vec<S>>,
    dimensions: Vec<Option<DimensionSet>>,
}

fn merge_values<S: FieldValue>(target: &mut Option<Vec<S>>, other: Option<&Vec<S>>, sign: f64, what: &str) {
    let Some(other) = other else {
        return;
    };
    match target {
        None => *target = Some(other.iter().map(|v| v.scale(sign)).collect()),
        Some(existing) => {
            if existing.len() != other.len() {
                fatal_error!(
                    "BlockLduSystem::merge",
                    what,
                    "size mismatch: {} and {}",
                    existing.len(),
                    other.len()
                );
            }
            for (a, b) in existing.iter_mut().zip(other) {
                *a = a.add(b.scale(sign));
            }
        }
    }
}

impl<const N: usize, S: FieldValue> BlockLduSystem<N, S> {
    /// A zero system over `addressing`, with every patch entry unset.
    pub fn new(name: impl Into<String>, addressing: Arc<LduAddressing>) -> Self {
        let n_patches = addressing.n_patches();
        let size = addressing.size();
        Self {
            name: name.into(),
            matrix: BlockLduMatrix::new(addressing),
            source: vec![S::zero(); size],
            internal_coeffs: vec![None; n_patches],
            boundary_coeffs: vec![None; n_patches],
            face_flux_correction: None,
            dimensions: vec![None; N],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matrix(&self) -> &BlockLduMatrix<N> {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut BlockLduMatrix<N> {
        &mut self.matrix
    }

    pub fn source(&self) -> &[S] {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut [S] {
        &mut self.source
    }

    pub fn n_patches(&self) -> usize {
        self.internal_coeffs.len()
    }

    fn patch_size(&self, patch: usize) -> usize {
        self.matrix.addressing().patch_addr(patch).len()
    }

    pub fn internal_coeffs(&self, patch: usize) -> Option<&CoeffField<N>> {
        self.internal_coeffs[patch].as_ref()
    }

    /// Internal coefficients of `patch`, allocated as scalar zeros if unset.
    pub fn internal_coeffs_mut(&mut self, patch: usize) -> &mut CoeffField<N> {
        let n = self.patch_size(patch);
        self.internal_coeffs[patch].get_or_insert_with(|| CoeffField::new(CoeffShape::Scalar, n))
    }

    pub fn set_internal_coeffs(&mut self, patch: usize, coeffs: CoeffField<N>) -> Result<()> {
        if coeffs.len() != self.patch_size(patch) {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "patch {} has {} faces, internal coefficients {}",
                patch,
                self.patch_size(patch),
                coeffs.len()
            )));
        }
        self.internal_coeffs[patch] = Some(coeffs);
        Ok(())
    }

    pub fn boundary_coeffs(&self, patch: usize) -> Option<&[S]> {
        self.boundary_coeffs[patch].as_deref()
    }

    pub fn boundary_coeffs_mut(&mut self, patch: usize) -> &mut Vec<S> {
        let n = self.patch_size(patch);
        self.boundary_coeffs[patch].get_or_insert_with(|| vec![S::zero(); n])
    }

    pub fn set_boundary_coeffs(&mut self, patch: usize, coeffs: Vec<S>) -> Result<()> {
        if coeffs.len() != self.patch_size(patch) {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "patch {} has {} faces, boundary coefficients {}",
                patch,
                self.patch_size(patch),
                coeffs.len()
            )));
        }
        self.boundary_coeffs[patch] = Some(coeffs);
        Ok(())
    }

    pub fn face_flux_correction(&self) -> Option<&[S]> {
        self.face_flux_correction.as_deref()
    }

    pub fn set_face_flux_correction(&mut self, correction: Vec<S>) -> Result<()> {
        let n_faces = self.matrix.addressing().n_faces();
        if correction.len() != n_faces {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "face-flux correction has {} entries for {} faces",
                correction.len(),
                n_faces
            )));
        }
        self.face_flux_correction = Some(correction);
        Ok(())
    }

    pub fn clear_face_flux_correction(&mut self) {
        self.face_flux_correction = None;
    }

    pub fn dimensions(&self, cmpt: usize) -> Option<&DimensionSet> {
        self.dimensions[cmpt].as_ref()
    }

    pub fn set_dimensions(&mut self, cmpt: usize, dimensions: DimensionSet) {
        self.dimensions[cmpt] = Some(dimensions);
    }

    fn inconsistent_dimensions(&self, operation: &str, cmpt: usize, lhs: &DimensionSet, rhs: &DimensionSet) -> ! {
        fatal_error!(
            operation,
            &self.name,
            "Inconsistent dimensions for component {}: {} {} {}",
            cmpt,
            lhs,
            operation,
            rhs
        )
    }

    fn check_dimensions(&self, other: &Self, operation: &str) {
        for (cmpt, (lhs, rhs)) in self.dimensions.iter().zip(&other.dimensions).enumerate() {
            if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                if lhs != rhs {
                    self.inconsistent_dimensions(operation, cmpt, lhs, rhs);
                }
            }
        }
    }

    /// Flips the sign of every stored coefficient, the source and the
    /// face-flux correction.
    pub fn negate(&mut self) {
        self.matrix.negate();
        self.source.iter_mut().for_each(|v| *v = v.neg());
        self.internal_coeffs.iter_mut().flatten().for_each(CoeffField::negate);
        for coeffs in self.boundary_coeffs.iter_mut().flatten() {
            coeffs.iter_mut().for_each(|v| *v = v.neg());
        }
        if let Some(correction) = self.face_flux_correction.as_mut() {
            correction.iter_mut().for_each(|v| *v = v.neg());
        }
    }

    /// Deep copy of `other` into `self`. Only the patch entries set on
    /// `other` are copied; unset dimensions on `self` adopt `other`'s.
    pub fn assign(&mut self, other: &Self) {
        self.matrix = other.matrix.clone();
        self.source.clone_from(&other.source);
        for (target, entry) in self.internal_coeffs.iter_mut().zip(&other.internal_coeffs) {
            if let Some(entry) = entry {
                *target = Some(entry.clone());
            }
        }
        for (target, entry) in self.boundary_coeffs.iter_mut().zip(&other.boundary_coeffs) {
            if let Some(entry) = entry {
                *target = Some(entry.clone());
            }
        }
        if let Some(correction) = &other.face_flux_correction {
            self.face_flux_correction = Some(correction.clone());
        }
        for cmpt in 0..N {
            match (self.dimensions[cmpt], other.dimensions[cmpt]) {
                (Some(lhs), Some(rhs)) if lhs != rhs => {
                    self.inconsistent_dimensions("operator=", cmpt, &lhs, &rhs)
                }
                (None, Some(rhs)) => self.dimensions[cmpt] = Some(rhs),
                _ => {}
            }
        }
    }

    /// Assignment between shared systems, where `target` and `source` may
    /// be the same object.
    pub fn assign_from(target: &RefCell<Self>, source: &RefCell<Self>) {
        if std::ptr::eq(target, source) {
            let name = source.borrow().name.clone();
            fatal_error!("BlockLduSystem::operator=", name, "attempted assignment to self");
        }
        target.borrow_mut().assign(&source.borrow());
    }

    fn check_compatible(&self, other: &Self, operation: &str) {
        if self.source.len() != other.source.len() || self.n_patches() != other.n_patches() {
            fatal_error!(
                operation,
                &self.name,
                "incompatible systems: {} rows / {} patches and {} rows / {} patches",
                self.source.len(),
                self.n_patches(),
                other.source.len(),
                other.n_patches()
            );
        }
        self.check_dimensions(other, operation);
    }

    fn combine(&mut self, other: &Self, sign: f64) {
        if sign < 0.0 {
            self.matrix -= &other.matrix;
        } else {
            self.matrix += &other.matrix;
        }
        for (a, b) in self.source.iter_mut().zip(&other.source) {
            *a = a.add(b.scale(sign));
        }
        for (target, entry) in self.internal_coeffs.iter_mut().zip(&other.internal_coeffs) {
            merge_coeffs(target, entry.as_ref(), sign);
        }
        for (target, entry) in self.boundary_coeffs.iter_mut().zip(&other.boundary_coeffs) {
            merge_values(target, entry.as_ref(), sign, &self.name);
        }
        merge_values(
            &mut self.face_flux_correction,
            other.face_flux_correction.as_ref(),
            sign,
            &self.name,
        );
    }

    /// Row scaling of the matrix and source only.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        self.matrix.scale_rows(factors);
        for (v, &s) in self.source.iter_mut().zip(factors) {
            *v = v.scale(s);
        }
    }

    /// `source - A psi`, with the block product projected onto the source
    /// type: component-wise when the unknown and source ranks agree,
    /// summed over components for a scalar source.
    pub fn residual(&self, psi: &[[f64; N]], interfaces: &LduInterfaceFieldPtrs) -> Result<Vec<S>> {
        let a_psi = self.matrix.amul(psi, interfaces)?;
        a_psi
            .iter()
            .zip(&self.source)
            .map(|(ax, b)| -> Result<S> { Ok(b.sub(project::<N, S>(ax)?)) })
            .collect()
    }
}

fn project<const N: usize, S: FieldValue>(value: &[f64; N]) -> Result<S> {
    if S::N_COMPONENTS == N {
        S::from_components(value).ok_or_else(|| HelyxCoreError::Internal("component count".to_string()))
    } else if S::N_COMPONENTS == 1 {
        Ok(S::uniform(value.iter().sum()))
    } else {
        Err(HelyxCoreError::UnsupportedOperation(format!(
            "cannot project a {}-component block onto {}",
            N,
            S::TYPE_NAME
        )))
    }
}

impl<const N: usize, S: FieldValue> AddAssign<&BlockLduSystem<N, S>> for BlockLduSystem<N, S> {
    fn add_assign(&mut self, other: &BlockLduSystem<N, S>) {
        self.check_compatible(other, "operator+=");
        self.combine(other, 1.0);
    }
}

impl<const N: usize, S: FieldValue> SubAssign<&BlockLduSystem<N, S>> for BlockLduSystem<N, S> {
    fn sub_assign(&mut self, other: &BlockLduSystem<N, S>) {
        self.check_compatible(other, "operator-=");
        self.combine(other, -1.0);
    }
}

impl<const N: usize, S: FieldValue> MulAssign<f64> for BlockLduSystem<N, S> {
    fn mul_assign(&mut self, s: f64) {
        if self.face_flux_correction.is_some() {
            fatal_error!(
                "BlockLduSystem::operator*=(scalar)",
                &self.name,
                "cannot scale a matrix containing a faceFluxCorrection"
            );
        }
        self.matrix *= s;
        self.source.iter_mut().for_each(|v| *v = v.scale(s));
        self.internal_coeffs.iter_mut().flatten().for_each(|c| *c *= s);
        for coeffs in self.boundary_coeffs.iter_mut().flatten() {
            coeffs.iter_mut().for_each(|v| *v = v.scale(s));
        }
    }
}

impl BlockLduSystem<3, f64> {
    /// Boundary contribution of the divergence of a vector unknown into a
    /// scalar (continuity) equation. `internal` and `boundary` are the value
    /// interpolation coefficients of the patch, `sf` its face area vectors.
    ///
    /// Coupled patches keep their neighbour contribution in the coupling
    /// coefficients; otherwise it is moved to the source.
    pub fn add_continuity_coupled_bc(
        &mut self,
        patch: usize,
        internal: &[Vector],
        boundary: &[Vector],
        sf: &[Vector],
        coupled: bool,
    ) -> Result<()> {
        let face_cells = self.matrix.addressing().patch_addr(patch).to_vec();
        let n = face_cells.len();
        if internal.len() != n || boundary.len() != n || sf.len() != n {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "patch {} has {} faces, coefficients {}/{}/{}",
                patch,
                n,
                internal.len(),
                boundary.len(),
                sf.len()
            )));
        }

        let internal_sf: Vec<Vector> = internal.iter().zip(sf).map(|(i, s)| i.cmpt_multiply(*s)).collect();
        let internal_sf = CoeffField::Linear(internal_sf);

        let diag = self.matrix.diag_mut();
        for (face, &cell) in face_cells.iter().enumerate() {
            diag.add_to_row(cell, &internal_sf, face);
        }

        if coupled {
            let mut boundary_sf = CoeffField::Linear(
                boundary.iter().zip(sf).map(|(b, s)| b.cmpt_multiply(*s)).collect(),
            );
            boundary_sf.negate();
            self.matrix.add_to_couple_lower(patch, &internal_sf);
            self.matrix.add_to_couple_upper(patch, &boundary_sf);
        } else {
            for (face, &cell) in face_cells.iter().enumerate() {
                self.source[cell] -= dot(&boundary[face], &sf[face]);
            }
        }
        self.set_boundary_coeffs(patch, vec![0.0; n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addressing(n: usize) -> Arc<LduAddressing> {
        Arc::new(
            LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect(), vec![vec![0], vec![n - 1]]).unwrap(),
        )
    }

    fn random_coeffs(rng: &mut fastrand::Rng, shape: CoeffShape, len: usize) -> CoeffField<3> {
        let mut value = || rng.f64() * 2.0 - 1.0;
        match shape {
            CoeffShape::Scalar => CoeffField::Scalar((0..len).map(|_| value()).collect()),
            CoeffShape::Linear => CoeffField::Linear((0..len).map(|_| [value(), value(), value()]).collect()),
            CoeffShape::Square => CoeffField::Square(
                (0..len)
                    .map(|_| [[value(), value(), value()], [value(), value(), value()], [value(), value(), value()]])
                    .collect(),
            ),
        }
    }

    fn random_shape(rng: &mut fastrand::Rng) -> CoeffShape {
        [CoeffShape::Scalar, CoeffShape::Linear, CoeffShape::Square][rng.usize(..3)]
    }

    /// A system with a random subset of its slots set.
    fn random_system(rng: &mut fastrand::Rng, addressing: &Arc<LduAddressing>) -> BlockLduSystem<3, Vector> {
        let n = addressing.size();
        let mut system = BlockLduSystem::new("U", addressing.clone());
        let shape = random_shape(rng);
        *system.matrix_mut().diag_mut() = random_coeffs(rng, shape, n);
        if rng.bool() {
            let shape = random_shape(rng);
            *system.matrix_mut().upper_mut() = random_coeffs(rng, shape, n - 1);
        }
        if rng.bool() {
            let shape = random_shape(rng);
            *system.matrix_mut().lower_mut() = random_coeffs(rng, shape, n - 1);
        }
        for v in system.source_mut() {
            *v = [rng.f64(), rng.f64(), rng.f64()];
        }
        for patch in 0..2 {
            if rng.bool() {
                let shape = random_shape(rng);
                system.set_internal_coeffs(patch, random_coeffs(rng, shape, 1)).unwrap();
            }
            if rng.bool() {
                system.set_boundary_coeffs(patch, vec![[rng.f64(), rng.f64(), rng.f64()]]).unwrap();
            }
        }
        if rng.bool() {
            system.set_face_flux_correction(vec![[rng.f64(), 0.0, rng.f64()]; n - 1]).unwrap();
        }
        system.set_dimensions(0, DimensionSet::velocity());
        system
    }

    fn assert_coeffs_close(a: Option<&CoeffField<3>>, b: Option<&CoeffField<3>>) {
        match (a, b) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                assert_eq!(a.shape(), b.shape());
                assert_eq!(a.len(), b.len());
                for row in 0..a.len() {
                    let (ba, bb) = (a.block(row), b.block(row));
                    for i in 0..3 {
                        for j in 0..3 {
                            assert!((ba[i][j] - bb[i][j]).abs() < 1e-12, "row {} [{}][{}]", row, i, j);
                        }
                    }
                }
            }
            _ => panic!("slot set on one side only"),
        }
    }

    fn assert_values_close(a: Option<&[Vector]>, b: Option<&[Vector]>) {
        match (a, b) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                assert_eq!(a.len(), b.len());
                for (x, y) in a.iter().zip(b) {
                    for d in 0..3 {
                        assert!((x[d] - y[d]).abs() < 1e-12);
                    }
                }
            }
            _ => panic!("entry set on one side only"),
        }
    }

    #[test]
    fn test_accumulate_is_associative() {
        let mut rng = fastrand::Rng::with_seed(42);
        let addressing = addressing(4);
        for _ in 0..20 {
            let a = random_system(&mut rng, &addressing);
            let b = random_system(&mut rng, &addressing);
            let c = random_system(&mut rng, &addressing);

            let mut left = a.clone();
            left += &b;
            left += &c;

            let mut bc = b.clone();
            bc += &c;
            let mut right = a.clone();
            right += &bc;

            assert_coeffs_close(left.matrix().diag(), right.matrix().diag());
            assert_coeffs_close(left.matrix().upper(), right.matrix().upper());
            assert_coeffs_close(left.matrix().lower(), right.matrix().lower());
            assert_values_close(Some(left.source()), Some(right.source()));
            for patch in 0..2 {
                assert_coeffs_close(left.internal_coeffs(patch), right.internal_coeffs(patch));
                assert_values_close(left.boundary_coeffs(patch), right.boundary_coeffs(patch));
            }
            assert_values_close(left.face_flux_correction(), right.face_flux_correction());
        }
    }

    #[test]
    fn test_double_negate_is_identity() {
        let mut rng = fastrand::Rng::with_seed(7);
        let addressing = addressing(5);
        for _ in 0..10 {
            let original = random_system(&mut rng, &addressing);
            let mut system = original.clone();
            system.negate();
            system.negate();
            assert_eq!(system, original);
        }
    }

    #[test]
    fn test_subtract_allocates_negated_entries() {
        let addressing = addressing(2);
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing.clone());
        let mut b: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing);
        b.set_boundary_coeffs(1, vec![[1.0, 2.0, 3.0]]).unwrap();
        b.set_internal_coeffs(0, CoeffField::Scalar(vec![4.0])).unwrap();
        a -= &b;
        assert_eq!(a.boundary_coeffs(1), Some(&[[-1.0, -2.0, -3.0]][..]));
        assert_eq!(a.internal_coeffs(0), Some(&CoeffField::Scalar(vec![-4.0])));
        assert_eq!(a.boundary_coeffs(0), None);
    }

    #[test]
    fn test_assign_copies_set_entries_only() {
        let addressing = addressing(2);
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing.clone());
        a.set_boundary_coeffs(0, vec![[9.0; 3]]).unwrap();
        let mut b: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing);
        b.set_boundary_coeffs(1, vec![[1.0; 3]]).unwrap();
        b.set_dimensions(0, DimensionSet::velocity());
        b.set_face_flux_correction(vec![[0.5; 3]]).unwrap();

        a.assign(&b);
        assert_eq!(a.boundary_coeffs(0), Some(&[[9.0; 3]][..]));
        assert_eq!(a.boundary_coeffs(1), Some(&[[1.0; 3]][..]));
        assert_eq!(a.dimensions(0), Some(&DimensionSet::velocity()));
        assert_eq!(a.face_flux_correction(), Some(&[[0.5; 3]][..]));
    }

    #[test]
    #[should_panic(expected = "attempted assignment to self")]
    fn test_self_assignment_is_fatal() {
        let system: RefCell<BlockLduSystem<3, Vector>> = RefCell::new(BlockLduSystem::new("U", addressing(2)));
        BlockLduSystem::assign_from(&system, &system);
    }

    #[test]
    #[should_panic(expected = "Inconsistent dimensions")]
    fn test_dimension_mismatch_is_fatal() {
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(2));
        let mut b: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(2));
        a.set_dimensions(0, DimensionSet::velocity());
        b.set_dimensions(0, DimensionSet::pressure());
        a += &b;
    }

    #[test]
    fn test_unset_dimensions_are_accepted() {
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(2));
        let mut b: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(2));
        b.set_dimensions(0, DimensionSet::pressure());
        a += &b;
        assert_eq!(a.dimensions(0), None);
    }

    #[test]
    #[should_panic(expected = "cannot scale a matrix containing a faceFluxCorrection")]
    fn test_scaling_with_flux_correction_is_fatal() {
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(3));
        a.set_face_flux_correction(vec![[0.0; 3]; 2]).unwrap();
        a *= 2.0;
    }

    #[test]
    fn test_scale_rows_leaves_patch_coeffs() {
        let mut a: BlockLduSystem<3, Vector> = BlockLduSystem::new("U", addressing(2));
        *a.matrix_mut().diag_mut() = CoeffField::Scalar(vec![1.0, 1.0]);
        a.source_mut()[1] = [1.0, 2.0, 3.0];
        a.set_boundary_coeffs(0, vec![[1.0; 3]]).unwrap();
        a.scale_rows(&[2.0, 3.0]);
        assert_eq!(a.matrix().diag(), Some(&CoeffField::Scalar(vec![2.0, 3.0])));
        assert_eq!(a.source()[1], [3.0, 6.0, 9.0]);
        assert_eq!(a.boundary_coeffs(0), Some(&[[1.0; 3]][..]));
    }

    #[test]
    fn test_continuity_bc_moves_uncoupled_part_to_source() {
        let mut div: BlockLduSystem<3, f64> = BlockLduSystem::new("p", addressing(2));
        let sf = [[2.0, 0.0, 0.0]];
        // fixed value inlet: no internal weight, boundary value (1, 0, 0)
        div.add_continuity_coupled_bc(0, &[[0.0; 3]], &[[1.0, 0.0, 0.0]], &sf, false)
            .unwrap();
        assert_eq!(div.source(), &[-2.0, 0.0]);
        assert_eq!(div.boundary_coeffs(0), Some(&[0.0][..]));

        // zero gradient outlet: full internal weight
        div.add_continuity_coupled_bc(1, &[[1.0; 3]], &[[0.0; 3]], &sf, false)
            .unwrap();
        assert_eq!(div.matrix().diag().unwrap().diag_component(1, 0), 2.0);
        assert_eq!(div.matrix().diag().unwrap().diag_component(1, 1), 0.0);

        let residual = div.residual(&[[0.0; 3], [1.0, 0.0, 0.0]], &[]).unwrap();
        assert_eq!(residual, vec![-2.0, -2.0]);
    }

    #[test]
    fn test_continuity_bc_coupled_keeps_coupling() {
        let mut div: BlockLduSystem<3, f64> = BlockLduSystem::new("p", addressing(2));
        let sf = [[0.0, 1.0, 0.0]];
        div.add_continuity_coupled_bc(1, &[[0.5; 3]], &[[0.5; 3]], &sf, true)
            .unwrap();
        assert_eq!(div.matrix().couple_lower(1), Some(&CoeffField::Linear(vec![[0.0, 0.5, 0.0]])));
        assert_eq!(div.matrix().couple_upper(1), Some(&CoeffField::Linear(vec![[-0.0, -0.5, -0.0]])));
        assert_eq!(div.source(), &[0.0, 0.0]);
    }
}
