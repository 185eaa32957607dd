//! Cached addressing of concatenated region meshes.
//!
//! A super mesh stacks the cells of several region meshes in list order:
//! region `i` owns rows `offsets[i]..offsets[i] + n_cells_i`. Its patches are
//! every region's patches, flattened in the same order. Entries stay cached
//! across solves until the caller reports that the meshes moved or changed
//! topology.

use crate::error::{FvError, Result};
use crate::fv_mesh::FvMesh;
use helyx_core::LduAddressing;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connectivity of a super mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperTopology {
    addressing: Arc<LduAddressing>,
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    patch_starts: Vec<usize>,
}

impl SuperTopology {
    fn build(meshes: &[&FvMesh]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(meshes.len());
        let mut sizes = Vec::with_capacity(meshes.len());
        let mut patch_starts = Vec::with_capacity(meshes.len());
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut patch_addr = Vec::new();

        let mut offset = 0;
        for mesh in meshes {
            offsets.push(offset);
            sizes.push(mesh.n_cells());
            patch_starts.push(patch_addr.len());
            let addressing = mesh.addressing();
            lower.extend(addressing.lower_addr().iter().map(|c| c + offset));
            upper.extend(addressing.upper_addr().iter().map(|c| c + offset));
            for cells in addressing.patch_addrs() {
                patch_addr.push(cells.iter().map(|c| c + offset).collect());
            }
            offset += mesh.n_cells();
        }

        Ok(Self {
            addressing: Arc::new(LduAddressing::new(offset, lower, upper, patch_addr)?),
            offsets,
            sizes,
            patch_starts,
        })
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn n_cells(&self) -> usize {
        self.addressing.size()
    }

    /// First row of each region.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Index of patch `patch` of region `region` in the flattened list.
    pub fn interface_position(&self, region: usize, patch: usize) -> usize {
        self.patch_starts[region] + patch
    }

    pub fn n_interfaces(&self) -> usize {
        self.addressing.n_patches()
    }

    fn matches(&self, meshes: &[&FvMesh]) -> bool {
        self.sizes.len() == meshes.len() && self.sizes.iter().zip(meshes).all(|(&n, m)| n == m.n_cells())
    }
}

/// Geometry of a super mesh: face areas of every flattened interface.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperGeometry {
    interface_mag_sf: Vec<Vec<f64>>,
}

impl SuperGeometry {
    fn build(meshes: &[&FvMesh]) -> Self {
        Self {
            interface_mag_sf: meshes
                .iter()
                .flat_map(|m| m.patches().iter().map(|p| p.mag_sf.clone()))
                .collect(),
        }
    }

    /// Face areas of the interface at flattened position `position`.
    pub fn interface_mag_sf(&self, position: usize) -> &[f64] {
        &self.interface_mag_sf[position]
    }

    pub fn n_interfaces(&self) -> usize {
        self.interface_mag_sf.len()
    }
}

#[derive(Debug, Clone, Default)]
struct SuperMeshEntry {
    topology: Option<Arc<SuperTopology>>,
    geometry: Option<Arc<SuperGeometry>>,
}

/// Super meshes keyed by super name.
#[derive(Debug, Clone, Default)]
pub struct SuperMeshRegistry {
    entries: BTreeMap<String, SuperMeshEntry>,
    topology_builds: u64,
    geometry_builds: u64,
}

impl SuperMeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The meshes moved: geometry is rebuilt on next use.
    pub fn mesh_moved(&mut self) {
        log::debug!("Super meshes moved: clearing {} geometries", self.entries.len());
        for entry in self.entries.values_mut() {
            entry.geometry = None;
        }
    }

    /// The meshes changed topology: everything is rebuilt on next use.
    pub fn mesh_topo_changed(&mut self) {
        log::debug!("Super mesh topology changed: clearing {} entries", self.entries.len());
        self.entries.clear();
    }

    pub fn topology(&mut self, super_name: &str, meshes: &[&FvMesh]) -> Result<Arc<SuperTopology>> {
        let entry = self.entries.entry(super_name.to_string()).or_default();
        if let Some(topology) = &entry.topology {
            if !topology.matches(meshes) {
                return Err(FvError::MeshError(format!(
                    "cached super mesh {} has regions of {:?} cells, meshes have {:?}; topology change not reported",
                    super_name,
                    topology.sizes(),
                    meshes.iter().map(|m| m.n_cells()).collect::<Vec<_>>()
                )));
            }
            return Ok(Arc::clone(topology));
        }
        log::debug!("Building super mesh topology {}", super_name);
        let topology = Arc::new(SuperTopology::build(meshes)?);
        entry.topology = Some(Arc::clone(&topology));
        self.topology_builds += 1;
        Ok(topology)
    }

    pub fn geometry(&mut self, super_name: &str, meshes: &[&FvMesh]) -> Arc<SuperGeometry> {
        let entry = self.entries.entry(super_name.to_string()).or_default();
        if let Some(geometry) = &entry.geometry {
            return Arc::clone(geometry);
        }
        log::debug!("Building super mesh geometry {}", super_name);
        let geometry = Arc::new(SuperGeometry::build(meshes));
        entry.geometry = Some(Arc::clone(&geometry));
        self.geometry_builds += 1;
        geometry
    }

    pub fn contains(&self, super_name: &str) -> bool {
        self.entries.contains_key(super_name)
    }

    /// Number of topologies built so far.
    pub fn topology_builds(&self) -> u64 {
        self.topology_builds
    }

    pub fn geometry_builds(&self) -> u64 {
        self.geometry_builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_offsets_rows_and_patches() {
        let a = FvMesh::one_dimensional("a", 3, 1.0, 1.0).unwrap();
        let b = FvMesh::one_dimensional("b", 2, 1.0, 1.0).unwrap();
        let mut registry = SuperMeshRegistry::new();
        let topology = registry.topology("T_plus_T", &[&a, &b]).unwrap();

        assert_eq!(topology.offsets(), &[0, 3]);
        assert_eq!(topology.n_cells(), 5);
        assert_eq!(topology.addressing().lower_addr(), &[0, 1, 3]);
        assert_eq!(topology.addressing().upper_addr(), &[1, 2, 4]);
        assert_eq!(topology.interface_position(1, 1), 3);
        assert_eq!(topology.addressing().patch_addr(3), &[4]);
    }

    #[test]
    fn test_moved_keeps_topology_and_topo_change_drops_both() {
        let a = FvMesh::one_dimensional("a", 2, 1.0, 1.0).unwrap();
        let mut registry = SuperMeshRegistry::new();
        registry.topology("p", &[&a]).unwrap();
        registry.geometry("p", &[&a]);

        registry.mesh_moved();
        registry.topology("p", &[&a]).unwrap();
        let geometry = registry.geometry("p", &[&a]);
        assert_eq!((registry.topology_builds(), registry.geometry_builds()), (1, 2));
        assert_eq!(geometry.n_interfaces(), 2);
        assert_eq!(geometry.interface_mag_sf(1), &[1.0]);

        registry.mesh_topo_changed();
        assert!(!registry.contains("p"));
        registry.topology("p", &[&a]).unwrap();
        assert_eq!(registry.topology_builds(), 2);
    }

    #[test]
    fn test_unreported_topology_change_is_an_error() {
        let a = FvMesh::one_dimensional("a", 2, 1.0, 1.0).unwrap();
        let refined = FvMesh::one_dimensional("a", 4, 1.0, 1.0).unwrap();
        let mut registry = SuperMeshRegistry::new();
        registry.topology("p", &[&a]).unwrap();
        assert!(registry.topology("p", &[&refined]).is_err());
    }
}
