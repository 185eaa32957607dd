//! Block-coupled assembly of vector equations and the continuity coupling
//! of a vector unknown into a scalar equation.

use crate::error::Result;
use crate::fvm::Dimensioned;
use crate::vol_field::VolField;
use helyx_core::{BlockLduSystem, CoeffField, DimensionSet, FieldValue, GlobalReduce, LduInterfaceField, Vector};
use helyx_lsolver::{BlockGaussSeidel, SolverControls, SolverPerformance};
use std::sync::Arc;

pub type BlockVectorSystem = BlockLduSystem<3, Vector>;

const LENGTH: DimensionSet = DimensionSet::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0);

/// `laplacian(gamma, U)` as one block system: scalar diagonal and face
/// coefficients, linear boundary coefficients.
pub fn block_laplacian(gamma: Dimensioned, psi: &VolField<Vector>) -> Result<BlockVectorSystem> {
    let mesh = Arc::clone(psi.mesh());
    let mut system = BlockVectorSystem::new(psi.name(), Arc::clone(mesh.addressing()));

    let upper = mesh
        .mag_sf()
        .iter()
        .zip(mesh.delta_coeffs())
        .map(|(s, d)| gamma.value * s * d)
        .collect();
    system.matrix_mut().set_off_diagonal(CoeffField::Scalar(upper), None)?;
    system.matrix_mut().neg_sum_diag();

    for (p, patch) in mesh.patches().iter().enumerate() {
        let patch_field = &psi.boundary()[p];
        let gi = patch_field.gradient_internal_coeffs(&patch.delta_coeffs);
        let gb = patch_field.gradient_boundary_coeffs(&patch.delta_coeffs);
        let internal = gi
            .iter()
            .zip(&patch.mag_sf)
            .map(|(c, s)| c.scale(gamma.value * s))
            .collect();
        let boundary = gb
            .iter()
            .zip(&patch.mag_sf)
            .map(|(c, s)| c.scale(-gamma.value * s))
            .collect();
        system.set_internal_coeffs(p, CoeffField::Linear(internal))?;
        system.set_boundary_coeffs(p, boundary)?;
    }

    let dimensions = gamma.dimensions * *psi.dimensions() * LENGTH;
    for cmpt in 0..3 {
        system.set_dimensions(cmpt, dimensions);
    }
    Ok(system)
}

/// Face flux `sum(Sf & U_f)` of a vector unknown into a scalar equation,
/// with linearly interpolated face values.
pub fn div_continuity(psi: &VolField<Vector>) -> Result<BlockLduSystem<3, f64>> {
    let mesh = Arc::clone(psi.mesh());
    let mut system = BlockLduSystem::<3, f64>::new(format!("div({})", psi.name()), Arc::clone(mesh.addressing()));

    let mut upper = Vec::with_capacity(mesh.n_internal_faces());
    let mut lower = Vec::with_capacity(mesh.n_internal_faces());
    for (sf, &w) in mesh.sf().iter().zip(mesh.weights()) {
        upper.push(sf.scale(1.0 - w));
        lower.push(sf.scale(-w));
    }
    system
        .matrix_mut()
        .set_off_diagonal(CoeffField::Linear(upper), Some(CoeffField::Linear(lower)))?;
    system.matrix_mut().neg_sum_diag();

    for (p, patch) in mesh.patches().iter().enumerate() {
        let patch_field = &psi.boundary()[p];
        let internal = patch_field.value_internal_coeffs(&patch.weights);
        let mut boundary = patch_field.value_boundary_coeffs(&patch.weights);
        let coupled = patch_field.coupled();
        if !coupled {
            for (b, v) in boundary.iter_mut().zip(patch_field.value()) {
                *b = b.cmpt_multiply(*v);
            }
        }
        system.add_continuity_coupled_bc(p, &internal, &boundary, &patch.sf, coupled)?;
    }
    Ok(system)
}

/// Solves a block vector system for `psi` with block Gauss-Seidel. The
/// system itself is left untouched.
pub fn solve_block(
    system: &BlockVectorSystem,
    psi: &mut VolField<Vector>,
    controls: &SolverControls,
    reduce: &dyn GlobalReduce,
) -> Result<SolverPerformance> {
    let mesh = Arc::clone(psi.mesh());
    let mut matrix = system.matrix().clone();
    let mut source = system.source().to_vec();

    for (p, patch) in mesh.patches().iter().enumerate() {
        if let Some(internal) = system.internal_coeffs(p) {
            let diag = matrix.diag_mut();
            for (face, &cell) in patch.face_cells.iter().enumerate() {
                diag.add_to_row(cell, internal, face);
            }
        }
        let Some(boundary) = system.boundary_coeffs(p) else {
            continue;
        };
        let patch_field = &psi.boundary()[p];
        if patch_field.coupled() {
            matrix.add_to_couple_upper(p, &CoeffField::Linear(boundary.to_vec()));
        } else {
            for ((&cell, c), v) in patch.face_cells.iter().zip(boundary).zip(patch_field.value()) {
                source[cell] = source[cell].add(c.cmpt_multiply(*v));
            }
        }
    }

    let interfaces: Vec<Option<Box<dyn LduInterfaceField>>> = psi.scalar_interfaces()?;
    let name = psi.name().to_string();
    let perf = BlockGaussSeidel::from_controls(controls).solve(
        &name,
        &matrix,
        &interfaces,
        psi.internal_mut(),
        &source,
        reduce,
    )?;
    psi.correct_boundary_conditions();
    mesh.set_solver_performance(&name, perf.clone());
    Ok(perf)
}
