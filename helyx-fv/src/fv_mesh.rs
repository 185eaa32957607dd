//! Finite-volume mesh of one region: LDU addressing, cell volumes, face
//! geometry and boundary patches.

use crate::error::{FvError, Result};
use helyx_core::{LduAddressing, Vector};
use helyx_lsolver::SolverPerformance;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum PatchKind {
    /// Physical boundary; the patch field decides the condition.
    Generic,
    /// Periodic coupling to another patch of the same mesh.
    Cyclic { neighbour_patch: usize },
    /// Coupling to a patch of another region's mesh, matched by names.
    RegionCoupled {
        neighbour_region: String,
        neighbour_patch: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FvPatch {
    pub name: String,
    pub kind: PatchKind,
    pub face_cells: Vec<usize>,
    pub sf: Vec<Vector>,
    pub mag_sf: Vec<f64>,
    pub delta_coeffs: Vec<f64>,
    pub weights: Vec<f64>,
}

impl FvPatch {
    pub fn new(name: impl Into<String>, face_cells: Vec<usize>, sf: Vec<Vector>, delta_coeffs: Vec<f64>) -> Self {
        let n = face_cells.len();
        let mag_sf = sf.iter().map(mag).collect();
        Self {
            name: name.into(),
            kind: PatchKind::Generic,
            face_cells,
            sf,
            mag_sf,
            delta_coeffs,
            weights: vec![1.0; n],
        }
    }

    pub fn size(&self) -> usize {
        self.face_cells.len()
    }

    /// Coupled to another patch of the same matrix.
    pub fn coupled(&self) -> bool {
        matches!(self.kind, PatchKind::Cyclic { .. })
    }

    pub fn region_coupled(&self) -> bool {
        matches!(self.kind, PatchKind::RegionCoupled { .. })
    }
}

/// Geometry of the internal faces, ordered as the LDU addressing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InternalFaces {
    pub owner: Vec<usize>,
    pub neighbour: Vec<usize>,
    pub sf: Vec<Vector>,
    pub delta_coeffs: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Solver performance of every solve in the current time step, per field.
#[derive(Debug, Default)]
pub struct PerformanceRegistry {
    entries: Mutex<BTreeMap<String, Vec<SolverPerformance>>>,
}

impl PerformanceRegistry {
    pub fn set(&self, field_name: &str, performance: SolverPerformance) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(field_name.to_string())
            .or_default()
            .push(performance);
    }

    pub fn get(&self, field_name: &str) -> Vec<SolverPerformance> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(field_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[derive(Debug)]
pub struct FvMesh {
    name: String,
    addressing: Arc<LduAddressing>,
    volumes: Vec<f64>,
    sf: Vec<Vector>,
    mag_sf: Vec<f64>,
    delta_coeffs: Vec<f64>,
    weights: Vec<f64>,
    patches: Vec<FvPatch>,
    performance: PerformanceRegistry,
}

fn mag(v: &Vector) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

impl FvMesh {
    pub fn new(name: impl Into<String>, volumes: Vec<f64>, faces: InternalFaces, patches: Vec<FvPatch>) -> Result<Self> {
        let name = name.into();
        let n_faces = faces.owner.len();
        if faces.sf.len() != n_faces || faces.delta_coeffs.len() != n_faces || faces.weights.len() != n_faces {
            return Err(FvError::MeshError(format!(
                "mesh {}: face geometry does not match {} internal faces",
                name, n_faces
            )));
        }
        if let Some(patch) = patches.iter().find(|p| {
            p.sf.len() != p.size() || p.delta_coeffs.len() != p.size() || p.weights.len() != p.size()
        }) {
            return Err(FvError::MeshError(format!(
                "mesh {}: patch {} geometry does not match its {} faces",
                name,
                patch.name,
                patch.size()
            )));
        }
        if volumes.iter().any(|&v| v <= 0.0) {
            return Err(FvError::MeshError(format!("mesh {} has a non-positive cell volume", name)));
        }

        let addressing = LduAddressing::new(
            volumes.len(),
            faces.owner,
            faces.neighbour,
            patches.iter().map(|p| p.face_cells.clone()).collect(),
        )?;
        let mag_sf = faces.sf.iter().map(mag).collect();
        Ok(Self {
            name,
            addressing: Arc::new(addressing),
            volumes,
            sf: faces.sf,
            mag_sf,
            delta_coeffs: faces.delta_coeffs,
            weights: faces.weights,
            patches,
            performance: PerformanceRegistry::default(),
        })
    }

    /// A row of `n_cells` cells along x between patches "left" and "right".
    pub fn one_dimensional(name: impl Into<String>, n_cells: usize, length: f64, area: f64) -> Result<Self> {
        if n_cells == 0 || length <= 0.0 || area <= 0.0 {
            return Err(FvError::MeshError(format!(
                "cannot build a 1D mesh of {} cells, length {}, area {}",
                n_cells, length, area
            )));
        }
        let dx = length / n_cells as f64;
        let n_faces = n_cells - 1;
        let faces = InternalFaces {
            owner: (0..n_faces).collect(),
            neighbour: (1..n_cells).collect(),
            sf: vec![[area, 0.0, 0.0]; n_faces],
            delta_coeffs: vec![1.0 / dx; n_faces],
            weights: vec![0.5; n_faces],
        };
        let patches = vec![
            FvPatch::new("left", vec![0], vec![[-area, 0.0, 0.0]], vec![2.0 / dx]),
            FvPatch::new("right", vec![n_cells - 1], vec![[area, 0.0, 0.0]], vec![2.0 / dx]),
        ];
        Self::new(name, vec![area * dx; n_cells], faces, patches)
    }

    /// Turns two boundary patches into a cyclic pair. Coupled delta
    /// coefficients span both half distances.
    pub fn couple_cyclic(mut self, a: &str, b: &str) -> Result<Self> {
        let ia = self.require_patch(a)?;
        let ib = self.require_patch(b)?;
        if ia == ib || self.patches[ia].size() != self.patches[ib].size() {
            return Err(FvError::MeshError(format!(
                "mesh {}: patches {} and {} cannot form a cyclic pair",
                self.name, a, b
            )));
        }
        let da: Vec<f64> = self.patches[ia].delta_coeffs.iter().map(|d| 1.0 / d).collect();
        let db: Vec<f64> = self.patches[ib].delta_coeffs.iter().map(|d| 1.0 / d).collect();
        for (own, nbr, dist_own, dist_nbr) in [(ia, ib, &da, &db), (ib, ia, &db, &da)] {
            let patch = &mut self.patches[own];
            patch.kind = PatchKind::Cyclic { neighbour_patch: nbr };
            patch.delta_coeffs = dist_own.iter().zip(dist_nbr).map(|(o, n)| 1.0 / (o + n)).collect();
            patch.weights = dist_own.iter().zip(dist_nbr).map(|(o, n)| n / (o + n)).collect();
        }
        Ok(self)
    }

    /// Marks `patch` as coupled to `neighbour_patch` of region `neighbour_region`.
    pub fn couple_region(mut self, patch: &str, neighbour_region: &str, neighbour_patch: &str) -> Result<Self> {
        let index = self.require_patch(patch)?;
        self.patches[index].kind = PatchKind::RegionCoupled {
            neighbour_region: neighbour_region.to_string(),
            neighbour_patch: neighbour_patch.to_string(),
        };
        Ok(self)
    }

    fn require_patch(&self, name: &str) -> Result<usize> {
        self.find_patch(name)
            .ok_or_else(|| FvError::MeshError(format!("mesh {} has no patch {}", self.name, name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn n_cells(&self) -> usize {
        self.volumes.len()
    }

    pub fn n_internal_faces(&self) -> usize {
        self.sf.len()
    }

    pub fn owner(&self) -> &[usize] {
        self.addressing.lower_addr()
    }

    pub fn neighbour(&self) -> &[usize] {
        self.addressing.upper_addr()
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn sf(&self) -> &[Vector] {
        &self.sf
    }

    pub fn mag_sf(&self) -> &[f64] {
        &self.mag_sf
    }

    pub fn delta_coeffs(&self) -> &[f64] {
        &self.delta_coeffs
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn patches(&self) -> &[FvPatch] {
        &self.patches
    }

    pub fn patch(&self, index: usize) -> &FvPatch {
        &self.patches[index]
    }

    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    /// Internal faces of `cell`, owned faces first.
    pub fn cell_faces(&self, cell: usize) -> Vec<usize> {
        let owner_start = self.addressing.owner_start();
        let mut faces: Vec<usize> = (owner_start[cell]..owner_start[cell + 1]).collect();
        faces.extend(
            self.addressing
                .losort()
                .iter()
                .copied()
                .filter(|&f| self.addressing.upper_addr()[f] == cell),
        );
        faces
    }

    /// `(patch, patch face)` of every boundary face next to `cell`.
    pub fn cell_boundary_faces(&self, cell: usize) -> Vec<(usize, usize)> {
        self.patches
            .iter()
            .enumerate()
            .flat_map(|(patch, p)| {
                p.face_cells
                    .iter()
                    .enumerate()
                    .filter(move |&(_, &c)| c == cell)
                    .map(move |(face, _)| (patch, face))
            })
            .collect()
    }

    pub fn performance(&self) -> &PerformanceRegistry {
        &self.performance
    }

    pub fn set_solver_performance(&self, field_name: &str, performance: SolverPerformance) {
        self.performance.set(field_name, performance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_dimensional_geometry() {
        let mesh = FvMesh::one_dimensional("solid", 4, 2.0, 0.5).unwrap();
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.n_internal_faces(), 3);
        assert_eq!(mesh.volumes(), &[0.25; 4]);
        assert_eq!(mesh.delta_coeffs(), &[2.0; 3]);
        assert_eq!(mesh.patch(1).face_cells, vec![3]);
        assert_eq!(mesh.patch(0).delta_coeffs, vec![4.0]);
        assert_eq!(mesh.patch(0).mag_sf, vec![0.5]);
    }

    #[test]
    fn test_cyclic_pair_spans_both_half_cells() {
        let mesh = FvMesh::one_dimensional("fluid", 4, 2.0, 1.0)
            .unwrap()
            .couple_cyclic("left", "right")
            .unwrap();
        assert_eq!(mesh.patch(0).kind, PatchKind::Cyclic { neighbour_patch: 1 });
        assert!((mesh.patch(1).delta_coeffs[0] - 2.0).abs() < 1e-12);
        assert!((mesh.patch(1).weights[0] - 0.5).abs() < 1e-12);
        assert!(mesh.patch(1).coupled());
    }

    #[test]
    fn test_cell_faces_include_neighbour_faces() {
        let mesh = FvMesh::one_dimensional("fluid", 3, 3.0, 1.0).unwrap();
        assert_eq!(mesh.cell_faces(1), vec![1, 0]);
        assert_eq!(mesh.cell_boundary_faces(0), vec![(0, 0)]);
        assert!(mesh.cell_boundary_faces(1).is_empty());
    }

    #[test]
    fn test_unknown_patch_rejected() {
        let mesh = FvMesh::one_dimensional("fluid", 3, 3.0, 1.0).unwrap();
        assert!(matches!(mesh.couple_region("top", "solid", "bottom"), Err(FvError::MeshError(_))));
    }
}
