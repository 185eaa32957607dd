//! One linear solve over the scalar matrices of several regions.
//!
//! The matrices are stacked into a super matrix, rows of region `i` after
//! those of regions `0..i`. Cyclic patches and region-coupled patches
//! become interfaces of the super matrix; a region-coupled patch reads its
//! neighbour values from the rows of the neighbour region.

use crate::error::{FvError, Result};
use crate::fv_matrix::FvMatrix;
use crate::fv_mesh::{FvMesh, PatchKind};
use crate::super_mesh::{SuperMeshRegistry, SuperTopology};
use crate::vol_field::{VolField, update_region_coupling};
use helyx_core::{
    CyclicLduInterfaceField, GlobalReduce, LduInterfaceField, LduMatrix, OffsetLduInterfaceField,
    RegionCoupledLduInterfaceField,
};
use helyx_lsolver::{SolverControls, SolverInputs, SolverPerformance, new_solver};
use std::sync::Arc;

/// Name of the super matrix of `field_names`.
pub fn make_super_name<S: AsRef<str>>(field_names: &[S]) -> String {
    field_names.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("_plus_")
}

type InterfaceList = Vec<Option<Box<dyn LduInterfaceField>>>;

/// Solves `matrices[i]` for `fields[i]` as one system.
///
/// The matrices keep their diagonal and source. `mesh_moved` and
/// `mesh_topo_changed` must report any change of the region meshes since
/// the previous call with the same fields.
pub fn solve(
    matrices: &mut [&mut FvMatrix<f64>],
    fields: &mut [&mut VolField<f64>],
    controls: &SolverControls,
    mesh_moved: bool,
    mesh_topo_changed: bool,
    registry: &mut SuperMeshRegistry,
    reduce: &dyn GlobalReduce,
) -> Result<SolverPerformance> {
    check_inputs(matrices, fields)?;
    let super_name = make_super_name(&fields.iter().map(|f| f.name().to_string()).collect::<Vec<_>>());
    log::info!("monolithicSolve: solving {} in {} regions", super_name, fields.len());

    log::debug!("Phase 1: boundary manipulation and diagonal snapshot");
    let mut saved_diag = Vec::with_capacity(matrices.len());
    let mut sources = Vec::with_capacity(matrices.len());
    for (matrix, field) in matrices.iter_mut().zip(fields.iter_mut()) {
        matrix.boundary_manipulate(field);
        saved_diag.push(matrix.diag().to_vec());

        let mut diag = matrix.diag().to_vec();
        matrix.add_boundary_diag(&mut diag, 0);
        *matrix.ldu_mut().diag_mut() = diag;

        let mut source = matrix.source().to_vec();
        matrix.add_boundary_source(&mut source, field, false);
        sources.push(source);
    }

    let result = solve_super(
        &super_name,
        matrices,
        fields,
        sources,
        controls,
        (mesh_moved, mesh_topo_changed),
        registry,
        reduce,
    );

    log::debug!("Phase 8: restoring diagonals and boundary conditions");
    for (matrix, diag) in matrices.iter_mut().zip(saved_diag) {
        *matrix.ldu_mut().diag_mut() = diag;
    }
    let perf = result?;

    update_region_coupling(fields)?;
    for field in fields.iter_mut() {
        field.correct_boundary_conditions();
        field.mesh().set_solver_performance(field.name(), perf.clone());
    }
    Ok(perf)
}

fn check_inputs(matrices: &[&mut FvMatrix<f64>], fields: &[&mut VolField<f64>]) -> Result<()> {
    if matrices.is_empty() || matrices.len() != fields.len() {
        return Err(FvError::FieldError(format!(
            "monolithicSolve needs one field per matrix, given {} matrices and {} fields",
            matrices.len(),
            fields.len()
        )));
    }
    for (matrix, field) in matrices.iter().zip(fields) {
        if matrix.psi_name() != field.name() || matrix.mesh().name() != field.mesh().name() {
            return Err(FvError::FieldError(format!(
                "monolithicSolve: matrix of {} on {} given field {} on {}",
                matrix.psi_name(),
                matrix.mesh().name(),
                field.name(),
                field.mesh().name()
            )));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn solve_super(
    super_name: &str,
    matrices: &mut [&mut FvMatrix<f64>],
    fields: &mut [&mut VolField<f64>],
    mut sources: Vec<Vec<f64>>,
    controls: &SolverControls,
    (mesh_moved, mesh_topo_changed): (bool, bool),
    registry: &mut SuperMeshRegistry,
    reduce: &dyn GlobalReduce,
) -> Result<SolverPerformance> {
    log::debug!("Phase 2: region coupling snapshots");
    update_region_coupling(fields)?;

    log::debug!("Phase 3: super mesh cache");
    if mesh_moved {
        registry.mesh_moved();
    }
    if mesh_topo_changed {
        registry.mesh_topo_changed();
    }
    let meshes: Vec<Arc<FvMesh>> = fields.iter().map(|f| Arc::clone(f.mesh())).collect();
    let mesh_refs: Vec<&FvMesh> = meshes.iter().map(|m| m.as_ref()).collect();
    let topology = registry.topology(super_name, &mesh_refs)?;
    let geometry = registry.geometry(super_name, &mesh_refs);
    if geometry.n_interfaces() != topology.n_interfaces() {
        return Err(FvError::MeshError(format!(
            "cached geometry of {} has {} interfaces, topology {}",
            super_name,
            geometry.n_interfaces(),
            topology.n_interfaces()
        )));
    }

    log::debug!("Phase 4: concatenating interface coefficients");
    let mut super_bou_coeffs = Vec::new();
    let mut super_int_coeffs = Vec::new();
    for (i, matrix) in matrices.iter_mut().enumerate() {
        let mesh = Arc::clone(matrix.mesh());
        for (j, patch) in mesh.patches().iter().enumerate() {
            let pbc = matrix.boundary_coeffs()[j].clone();
            let pic = matrix.internal_coeffs()[j].clone();
            let patch_field = &mut fields[i].boundary_mut()[j];
            if !patch_field.is_region_coupled() {
                super_bou_coeffs.push(pbc);
                super_int_coeffs.push(pic);
                continue;
            }

            let mag_sf = geometry.interface_mag_sf(topology.interface_position(i, j));
            let (psic, psbc, face_corr) = patch_field.region_coupled_boundary_coeffs(&pbc, &pic, mag_sf)?;
            let diag = matrix.ldu_mut().diag_mut();
            for (face, &cell) in patch.face_cells.iter().enumerate() {
                diag[cell] += psic[face] - pic[face];
                sources[i][cell] += pbc[face] * face_corr[face];
            }
            super_bou_coeffs.push(psbc);
            super_int_coeffs.push(psic);
        }
    }

    log::debug!("Phase 5: super matrix");
    let super_matrix = super_matrix(&topology, matrices)?;

    log::debug!("Phase 6: super interfaces");
    let interfaces = super_interfaces(&topology, &meshes, matrices, fields, &mut sources)?;

    log::debug!("Phase 7: solving {} rows", topology.n_cells());
    let mut super_psi: Vec<f64> = fields.iter().flat_map(|f| f.internal().iter().copied()).collect();
    let super_source: Vec<f64> = sources.concat();
    let inputs = SolverInputs {
        field_name: super_name,
        matrix: &super_matrix,
        interface_bou_coeffs: &super_bou_coeffs,
        interface_int_coeffs: &super_int_coeffs,
        interfaces: &interfaces,
        reduce,
    };
    let perf = new_solver(inputs, controls)?.solve(&mut super_psi, &super_source)?;

    for (i, field) in fields.iter_mut().enumerate() {
        let offset = topology.offsets()[i];
        let size = topology.sizes()[i];
        field.internal_mut().copy_from_slice(&super_psi[offset..offset + size]);
    }
    Ok(perf)
}

fn super_matrix(topology: &SuperTopology, matrices: &[&mut FvMatrix<f64>]) -> Result<LduMatrix> {
    let diag: Vec<f64> = matrices.iter().flat_map(|m| m.diag().iter().copied()).collect();
    let upper: Vec<f64> = matrices.iter().flat_map(|m| m.ldu().upper().iter().copied()).collect();
    let lower = matrices
        .iter()
        .any(|m| m.ldu().asymmetric())
        .then(|| matrices.iter().flat_map(|m| m.ldu().lower().iter().copied()).collect());
    Ok(LduMatrix::from_coeffs(Arc::clone(topology.addressing()), diag, upper, lower)?)
}

/// One slot per flattened patch. Region-coupled patches take back the
/// boundary source they were given as uncoupled patches.
fn super_interfaces(
    topology: &SuperTopology,
    meshes: &[Arc<FvMesh>],
    matrices: &[&mut FvMatrix<f64>],
    fields: &[&mut VolField<f64>],
    sources: &mut [Vec<f64>],
) -> Result<InterfaceList> {
    let mut interfaces: InterfaceList = Vec::with_capacity(topology.n_interfaces());
    for (i, mesh) in meshes.iter().enumerate() {
        let (offset, size) = (topology.offsets()[i], topology.sizes()[i]);
        for (j, patch) in mesh.patches().iter().enumerate() {
            debug_assert_eq!(interfaces.len(), topology.interface_position(i, j));
            let interface: Option<Box<dyn LduInterfaceField>> = match &patch.kind {
                PatchKind::Generic => None,
                PatchKind::Cyclic { neighbour_patch } => {
                    let inner = CyclicLduInterfaceField::new(
                        patch.face_cells.clone(),
                        mesh.patch(*neighbour_patch).face_cells.clone(),
                    )?;
                    Some(Box::new(OffsetLduInterfaceField::new(
                        Box::new(inner),
                        offset,
                        size,
                        offset,
                        size,
                    )))
                }
                PatchKind::RegionCoupled {
                    neighbour_region,
                    neighbour_patch,
                } => {
                    let foreign = meshes.iter().position(|m| m.name() == neighbour_region).ok_or_else(|| {
                        FvError::MeshError(format!(
                            "patch {} of {} is coupled to region {} which is not being solved",
                            patch.name,
                            mesh.name(),
                            neighbour_region
                        ))
                    })?;
                    let foreign_mesh = &meshes[foreign];
                    let foreign_patch = foreign_mesh.find_patch(neighbour_patch).ok_or_else(|| {
                        FvError::MeshError(format!("mesh {} has no patch {}", foreign_mesh.name(), neighbour_patch))
                    })?;
                    let inner = RegionCoupledLduInterfaceField::new(
                        patch.face_cells.clone(),
                        foreign_mesh.patch(foreign_patch).face_cells.clone(),
                    )?;

                    let pbc = &matrices[i].boundary_coeffs()[j];
                    let pf = fields[i].boundary()[j].value();
                    for ((&cell, c), v) in patch.face_cells.iter().zip(pbc).zip(pf) {
                        sources[i][cell] -= c * v;
                    }

                    Some(Box::new(OffsetLduInterfaceField::new(
                        Box::new(inner),
                        offset,
                        size,
                        topology.offsets()[foreign],
                        topology.sizes()[foreign],
                    )))
                }
            };
            interfaces.push(interface);
        }
    }
    Ok(interfaces)
}
