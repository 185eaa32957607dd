//! Cell-centred fields with their boundary conditions.

use crate::error::{FvError, Result};
use crate::fv_mesh::{FvMesh, PatchKind};
use crate::patch_field::{NeighbourSnapshot, PatchField, PatchFieldKind};
use helyx_core::{CyclicLduInterfaceField, DimensionSet, FieldValue, LduInterfaceField};
use std::sync::Arc;

/// Per-face values of the internal faces and of every patch.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceField<T> {
    pub internal: Vec<T>,
    pub boundary: Vec<Vec<T>>,
}

impl<T: FieldValue> SurfaceField<T> {
    pub fn uniform(mesh: &FvMesh, value: T) -> Self {
        Self {
            internal: vec![value; mesh.n_internal_faces()],
            boundary: mesh.patches().iter().map(|p| vec![value; p.size()]).collect(),
        }
    }

    pub fn map_values(&mut self, f: impl Fn(T) -> T) {
        self.internal.iter_mut().for_each(|v| *v = f(*v));
        for patch in self.boundary.iter_mut() {
            patch.iter_mut().for_each(|v| *v = f(*v));
        }
    }

    pub fn zip_apply(&mut self, other: &Self, f: impl Fn(T, T) -> T) {
        for (a, b) in self.internal.iter_mut().zip(&other.internal) {
            *a = f(*a, *b);
        }
        for (pa, pb) in self.boundary.iter_mut().zip(&other.boundary) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a = f(*a, *b);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolField<T: FieldValue> {
    name: String,
    mesh: Arc<FvMesh>,
    dimensions: DimensionSet,
    internal: Vec<T>,
    boundary: Vec<PatchField<T>>,
}

impl<T: FieldValue> VolField<T> {
    /// A uniform field. Cyclic and region-coupled mesh patches get the
    /// matching coupled condition, all others zero gradient.
    pub fn uniform(name: impl Into<String>, mesh: Arc<FvMesh>, dimensions: DimensionSet, value: T) -> Self {
        let boundary = mesh
            .patches()
            .iter()
            .map(|patch| match &patch.kind {
                PatchKind::Generic => PatchField::new(PatchFieldKind::ZeroGradient, vec![value; patch.size()]),
                PatchKind::Cyclic { neighbour_patch } => PatchField::cyclic(*neighbour_patch, patch.size()),
                PatchKind::RegionCoupled { .. } => PatchField::region_coupled(patch.size()),
            })
            .collect();
        let mut field = Self {
            name: name.into(),
            internal: vec![value; mesh.n_cells()],
            mesh,
            dimensions,
            boundary,
        };
        field.correct_boundary_conditions();
        field
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    pub fn size(&self) -> usize {
        self.internal.len()
    }

    pub fn internal(&self) -> &[T] {
        &self.internal
    }

    pub fn internal_mut(&mut self) -> &mut [T] {
        &mut self.internal
    }

    pub fn boundary(&self) -> &[PatchField<T>] {
        &self.boundary
    }

    pub fn boundary_mut(&mut self) -> &mut [PatchField<T>] {
        &mut self.boundary
    }

    fn require_patch(&self, patch: &str) -> Result<usize> {
        self.mesh.find_patch(patch).ok_or_else(|| {
            FvError::FieldError(format!("field {}: mesh {} has no patch {}", self.name, self.mesh.name(), patch))
        })
    }

    /// Replaces the condition of a physical patch with a fixed value.
    pub fn set_fixed_value(&mut self, patch: &str, value: T) -> Result<()> {
        let index = self.require_patch(patch)?;
        let mesh_patch = self.mesh.patch(index);
        if mesh_patch.kind != PatchKind::Generic {
            return Err(FvError::FieldError(format!(
                "field {}: patch {} is coupled and cannot take a fixed value",
                self.name, patch
            )));
        }
        self.boundary[index] = PatchField::fixed_value(vec![value; mesh_patch.size()]);
        Ok(())
    }

    /// Sets the interface source per unit area of a region-coupled patch.
    pub fn set_interface_source(&mut self, patch: &str, q: f64) -> Result<()> {
        let index = self.require_patch(patch)?;
        let name = self.name.clone();
        let state = self.boundary[index].region_coupled_state_mut().ok_or_else(|| {
            FvError::FieldError(format!("field {}: patch {} is not region-coupled", name, patch))
        })?;
        state.q_sum.iter_mut().for_each(|v| *v = q);
        Ok(())
    }

    pub fn patch_internal_field(&self, patch: usize) -> Vec<T> {
        self.mesh
            .patch(patch)
            .face_cells
            .iter()
            .map(|&cell| self.internal[cell])
            .collect()
    }

    /// Values across a coupled patch; `None` on uncoupled patches.
    pub fn patch_neighbour_field(&self, patch: usize) -> Option<Vec<T>> {
        match self.mesh.patch(patch).kind {
            PatchKind::Cyclic { neighbour_patch } => Some(self.patch_internal_field(neighbour_patch)),
            _ => None,
        }
    }

    pub fn correct_boundary_conditions(&mut self) {
        for patch in 0..self.boundary.len() {
            let internal = self.patch_internal_field(patch);
            let neighbour = self.patch_neighbour_field(patch);
            let weights = &self.mesh.patch(patch).weights;
            self.boundary[patch].evaluate(&internal, neighbour.as_deref(), weights);
        }
    }

    /// Coupled interfaces of a segregated solve, one slot per patch.
    /// Region-coupled patches are explicit here and stay unset.
    pub fn scalar_interfaces(&self) -> Result<Vec<Option<Box<dyn LduInterfaceField>>>> {
        self.mesh
            .patches()
            .iter()
            .map(|patch| -> Result<Option<Box<dyn LduInterfaceField>>> {
                match patch.kind {
                    PatchKind::Cyclic { neighbour_patch } => Ok(Some(Box::new(CyclicLduInterfaceField::new(
                        patch.face_cells.clone(),
                        self.mesh.patch(neighbour_patch).face_cells.clone(),
                    )?))),
                    _ => Ok(None),
                }
            })
            .collect()
    }

    pub fn weighted_average(&self) -> T {
        let volumes = self.mesh.volumes();
        let total: f64 = volumes.iter().sum();
        self.internal
            .iter()
            .zip(volumes)
            .fold(T::zero(), |acc, (v, vol)| acc.add(v.scale(*vol)))
            .scale(1.0 / total)
    }
}

impl VolField<f64> {
    /// Cell and boundary product `self*other`, named `(self*other)`. Patch
    /// conditions are taken from `other`.
    pub fn product(&self, other: &VolField<f64>) -> Result<VolField<f64>> {
        if !Arc::ptr_eq(&self.mesh, &other.mesh) {
            return Err(FvError::FieldError(format!(
                "cannot multiply {} on mesh {} by {} on mesh {}",
                self.name,
                self.mesh.name(),
                other.name,
                other.mesh.name()
            )));
        }
        let mut product = other.clone();
        product.name = format!("({}*{})", self.name, other.name);
        product.dimensions = self.dimensions * other.dimensions;
        for (p, a) in product.internal.iter_mut().zip(&self.internal) {
            *p *= a;
        }
        for (patch, own) in product.boundary.iter_mut().zip(&self.boundary) {
            for (p, a) in patch.value_mut().iter_mut().zip(own.value()) {
                *p *= a;
            }
        }
        Ok(product)
    }
}

/// Refreshes, for every region-coupled patch, the data seen from the
/// matching patch of the neighbour region: its adjacent cell values and
/// matrix snapshot. Every neighbour region must be among `fields`.
pub fn update_region_coupling<T: FieldValue>(fields: &mut [&mut VolField<T>]) -> Result<()> {
    let mut snapshots = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        for (j, patch) in field.mesh.patches().iter().enumerate() {
            let PatchKind::RegionCoupled { neighbour_region, neighbour_patch } = &patch.kind else {
                continue;
            };
            let nbr_field = fields
                .iter()
                .find(|f| f.mesh.name() == neighbour_region)
                .ok_or_else(|| {
                    FvError::FieldError(format!(
                        "field {}: no field on neighbour region {} of patch {}",
                        field.name, neighbour_region, patch.name
                    ))
                })?;
            let nbr_index = nbr_field.require_patch(neighbour_patch)?;
            let nbr_patch = nbr_field.mesh.patch(nbr_index);
            if nbr_patch.size() != patch.size() {
                return Err(FvError::FieldError(format!(
                    "region-coupled patches {} ({}) and {} ({}) differ in size",
                    patch.name,
                    patch.size(),
                    nbr_patch.name,
                    nbr_patch.size()
                )));
            }
            let state = nbr_field.boundary[nbr_index].region_coupled_state().ok_or_else(|| {
                FvError::FieldError(format!(
                    "field {}: patch {} is not region-coupled",
                    nbr_field.name, nbr_patch.name
                ))
            })?;
            snapshots.push((
                i,
                j,
                NeighbourSnapshot {
                    internal: nbr_field.patch_internal_field(nbr_index),
                    ci: state.ci.clone(),
                    cb: state.cb.clone(),
                    flux_corr: state.flux_corr.clone(),
                    q_sum: state.q_sum.clone(),
                    mag_sf: nbr_patch.mag_sf.clone(),
                },
            ));
        }
    }
    for (i, j, snapshot) in snapshots {
        if let Some(state) = fields[i].boundary[j].region_coupled_state_mut() {
            state.neighbour = snapshot;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_gradient_follows_internal() {
        let mesh = Arc::new(FvMesh::one_dimensional("fluid", 3, 3.0, 1.0).unwrap());
        let mut t = VolField::uniform("T", mesh, DimensionSet::temperature(), 1.0);
        t.internal_mut().copy_from_slice(&[1.0, 2.0, 5.0]);
        t.set_fixed_value("left", 0.0).unwrap();
        t.correct_boundary_conditions();
        assert_eq!(t.boundary()[0].value(), &[0.0]);
        assert_eq!(t.boundary()[1].value(), &[5.0]);
    }

    #[test]
    fn test_product_covers_boundary_and_dimensions() {
        let mesh = Arc::new(FvMesh::one_dimensional("fluid", 2, 1.0, 1.0).unwrap());
        let mut alpha = VolField::uniform("alpha", Arc::clone(&mesh), DimensionSet::dimensionless(), 0.5);
        alpha.set_fixed_value("left", 0.25).unwrap();
        let density = DimensionSet::new(1.0, -3.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let mut rho = VolField::uniform("rho", Arc::clone(&mesh), density, 2.0);
        rho.internal_mut()[1] = 4.0;
        rho.set_fixed_value("left", 8.0).unwrap();
        rho.correct_boundary_conditions();

        let alpha_rho = alpha.product(&rho).unwrap();
        assert_eq!(alpha_rho.name(), "(alpha*rho)");
        assert_eq!(*alpha_rho.dimensions(), density);
        assert_eq!(alpha_rho.internal(), &[1.0, 2.0]);
        assert_eq!(alpha_rho.boundary()[0].value(), &[2.0]);
        assert_eq!(alpha_rho.boundary()[1].value(), &[2.0]);

        let other = Arc::new(FvMesh::one_dimensional("solid", 2, 1.0, 1.0).unwrap());
        let t = VolField::uniform("T", other, DimensionSet::temperature(), 1.0);
        assert!(t.product(&rho).is_err());
    }

    #[test]
    fn test_cyclic_patch_value_interpolates_across() {
        let mesh = Arc::new(
            FvMesh::one_dimensional("fluid", 4, 4.0, 1.0)
                .unwrap()
                .couple_cyclic("left", "right")
                .unwrap(),
        );
        let mut u = VolField::uniform("U", mesh, DimensionSet::velocity(), [0.0; 3]);
        u.internal_mut()[0] = [2.0, 0.0, 0.0];
        u.internal_mut()[3] = [4.0, 0.0, 0.0];
        u.correct_boundary_conditions();
        assert_eq!(u.boundary()[0].value(), &[[3.0, 0.0, 0.0]]);
        assert!(u.scalar_interfaces().unwrap().iter().all(Option::is_some));
        assert!(u.set_fixed_value("left", [1.0; 3]).is_err());
    }

    #[test]
    fn test_region_coupling_needs_neighbour_field() {
        let solid = Arc::new(
            FvMesh::one_dimensional("solid", 2, 1.0, 1.0)
                .unwrap()
                .couple_region("right", "fluid", "left")
                .unwrap(),
        );
        let fluid = Arc::new(
            FvMesh::one_dimensional("fluid", 2, 1.0, 1.0)
                .unwrap()
                .couple_region("left", "solid", "right")
                .unwrap(),
        );
        let mut ts = VolField::uniform("T", solid.clone(), DimensionSet::temperature(), 300.0);
        let mut tf = VolField::uniform("T", fluid, DimensionSet::temperature(), 350.0);
        assert!(update_region_coupling(&mut [&mut ts]).is_err());

        update_region_coupling(&mut [&mut ts, &mut tf]).unwrap();
        let state = ts.boundary()[1].region_coupled_state().unwrap();
        assert_eq!(state.neighbour.internal, vec![350.0]);
        assert!(ts.scalar_interfaces().unwrap().iter().all(Option::is_none));
    }
}
