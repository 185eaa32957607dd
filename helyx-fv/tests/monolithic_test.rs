use helyx_core::SerialCommunicator;
use helyx_fv::fvm::{self, Dimensioned};
use helyx_fv::monolithic_solve::{self, make_super_name};
use helyx_fv::{DimensionSet, FvError, FvMatrix, FvMesh, SolverControls, SuperMeshRegistry, VolField};
use std::sync::Arc;

// Helper for float comparison in tests
fn assert_approx_eq_vec(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len(), "Vector lengths differ");
    for i in 0..a.len() {
        let diff = (a[i] - b[i]).abs();
        assert!(
            diff <= tolerance,
            "Verification failed at index {}: expected {}, got {}, diff {}",
            i,
            b[i],
            a[i],
            diff
        );
    }
}

/// Two regions of `n` cells over `0..1` and `1..2`, coupled at x = 1.
fn coupled_pair(n: usize) -> (Arc<FvMesh>, Arc<FvMesh>) {
    coupled_pair_with_area(n, 1.0)
}

fn coupled_pair_with_area(n: usize, area: f64) -> (Arc<FvMesh>, Arc<FvMesh>) {
    let solid = FvMesh::one_dimensional("solid", n, 1.0, area)
        .unwrap()
        .couple_region("right", "fluid", "left")
        .unwrap();
    let fluid = FvMesh::one_dimensional("fluid", n, 1.0, area)
        .unwrap()
        .couple_region("left", "solid", "right")
        .unwrap();
    (Arc::new(solid), Arc::new(fluid))
}

/// Solves the single-cell pair on meshes of cross-section `area` and
/// returns the two cell temperatures.
fn solve_single_cells(area: f64, mesh_moved: bool, registry: &mut SuperMeshRegistry) -> (f64, f64) {
    let (solid, fluid) = coupled_pair_with_area(1, area);
    let (mut ts, mut tf) = temperatures(&solid, &fluid);
    let mut ms = fvm::laplacian(Dimensioned::dimensionless(1.0), &ts);
    let mut mf = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);
    monolithic_solve::solve(
        &mut [&mut ms, &mut mf],
        &mut [&mut ts, &mut tf],
        &controls(),
        mesh_moved,
        false,
        registry,
        &SerialCommunicator::new(),
    )
    .unwrap();
    (ts.internal()[0], tf.internal()[0])
}

/// Temperature held at 0 on the far left and 1 on the far right.
fn temperatures(solid: &Arc<FvMesh>, fluid: &Arc<FvMesh>) -> (VolField<f64>, VolField<f64>) {
    let mut ts = VolField::uniform("T", Arc::clone(solid), DimensionSet::temperature(), 0.5);
    let mut tf = VolField::uniform("T", Arc::clone(fluid), DimensionSet::temperature(), 0.5);
    ts.set_fixed_value("left", 0.0).unwrap();
    tf.set_fixed_value("right", 1.0).unwrap();
    (ts, tf)
}

fn controls() -> SolverControls {
    SolverControls::new("PCG").with_tolerance(1e-12, 0.0).with_max_iter(200)
}

#[test]
fn test_single_cell_regions_match_hand_assembled_system() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (solid, fluid) = coupled_pair(1);
    let (mut ts, mut tf) = temperatures(&solid, &fluid);
    let mut ms = fvm::laplacian(Dimensioned::dimensionless(1.0), &ts);
    let mut mf = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);
    let diag_before = (ms.diag().to_vec(), mf.diag().to_vec());
    let source_before = (ms.source().to_vec(), mf.source().to_vec());

    let mut registry = SuperMeshRegistry::new();
    let perf = monolithic_solve::solve(
        &mut [&mut ms, &mut mf],
        &mut [&mut ts, &mut tf],
        &controls(),
        false,
        false,
        &mut registry,
        &SerialCommunicator::new(),
    )
    .unwrap();

    // -3 Ts + Tf = 0 and Ts - 3 Tf = -2
    assert!(perf.converged);
    assert_approx_eq_vec(ts.internal(), &[0.25], 1e-9);
    assert_approx_eq_vec(tf.internal(), &[0.75], 1e-9);
    assert_eq!((ms.diag().to_vec(), mf.diag().to_vec()), diag_before);
    assert_eq!((ms.source().to_vec(), mf.source().to_vec()), source_before);
}

#[test]
fn test_coupled_regions_reproduce_one_mesh_profile() {
    let (solid, fluid) = coupled_pair(2);
    let (mut ts, mut tf) = temperatures(&solid, &fluid);
    let mut ms = fvm::laplacian(Dimensioned::dimensionless(1.0), &ts);
    let mut mf = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);

    monolithic_solve::solve(
        &mut [&mut ms, &mut mf],
        &mut [&mut ts, &mut tf],
        &controls(),
        false,
        false,
        &mut SuperMeshRegistry::new(),
        &SerialCommunicator::new(),
    )
    .unwrap();

    assert_approx_eq_vec(ts.internal(), &[0.125, 0.375], 1e-9);
    assert_approx_eq_vec(tf.internal(), &[0.625, 0.875], 1e-9);
    // interface value seen from both sides
    assert_approx_eq_vec(ts.boundary()[1].value(), &[0.5], 1e-9);
    assert_approx_eq_vec(tf.boundary()[0].value(), &[0.5], 1e-9);

    for mesh in [&solid, &fluid] {
        let entries = mesh.performance().get("T");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name, make_super_name(&["T", "T"]));
    }
}

#[test]
fn test_super_mesh_cache_follows_mesh_flags() {
    let (solid, fluid) = coupled_pair(2);
    let (mut ts, mut tf) = temperatures(&solid, &fluid);
    let comm = SerialCommunicator::new();
    let mut registry = SuperMeshRegistry::new();

    for (moved, topo_changed) in [(false, false), (false, false), (true, false), (false, true)] {
        let mut ms = fvm::laplacian(Dimensioned::dimensionless(1.0), &ts);
        let mut mf = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);
        monolithic_solve::solve(
            &mut [&mut ms, &mut mf],
            &mut [&mut ts, &mut tf],
            &controls(),
            moved,
            topo_changed,
            &mut registry,
            &comm,
        )
        .unwrap();
    }

    assert!(registry.contains("T_plus_T"));
    assert_eq!(registry.topology_builds(), 2);
    assert_eq!(registry.geometry_builds(), 3);
}

#[test]
fn test_interface_areas_come_from_cached_geometry() {
    let mut registry = SuperMeshRegistry::new();
    let (ts, tf) = solve_single_cells(1.0, false, &mut registry);
    assert_approx_eq_vec(&[ts, tf], &[0.25, 0.75], 1e-9);

    // reported move: areas rebuilt, the profile does not depend on the cross-section
    let (ts, tf) = solve_single_cells(2.0, true, &mut registry);
    assert_approx_eq_vec(&[ts, tf], &[0.25, 0.75], 1e-9);
    assert_eq!(registry.geometry_builds(), 2);

    // unreported move: the cached areas of the previous meshes are used
    let (ts, _) = solve_single_cells(4.0, false, &mut registry);
    assert_eq!(registry.geometry_builds(), 2);
    assert!((ts - 0.25).abs() > 1e-3, "stale interface areas gave {}", ts);
}

#[test]
fn test_missing_neighbour_region_fails_and_restores_diagonal() {
    let (solid, _fluid) = coupled_pair(2);
    let mut ts = VolField::uniform("T", Arc::clone(&solid), DimensionSet::temperature(), 0.0);
    ts.set_fixed_value("left", 0.0).unwrap();
    let mut ms = fvm::laplacian(Dimensioned::dimensionless(1.0), &ts);
    let diag_before = ms.diag().to_vec();

    let result = monolithic_solve::solve(
        &mut [&mut ms],
        &mut [&mut ts],
        &controls(),
        false,
        false,
        &mut SuperMeshRegistry::new(),
        &SerialCommunicator::new(),
    );
    assert!(matches!(result, Err(FvError::FieldError(_))));
    assert_eq!(ms.diag(), diag_before.as_slice());
}

#[test]
fn test_cyclic_region_solved_through_offset_interfaces() {
    let mesh = Arc::new(
        FvMesh::one_dimensional("loop", 4, 1.0, 1.0)
            .unwrap()
            .couple_cyclic("left", "right")
            .unwrap(),
    );
    let mut t = VolField::uniform("T", Arc::clone(&mesh), DimensionSet::temperature(), 0.0);
    let mut eqn: FvMatrix<f64> = fvm::laplacian(Dimensioned::dimensionless(1.0), &t);
    let per_area = DimensionSet::new(0.0, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    eqn -= &fvm::sp_uniform(Dimensioned::new(1.0, per_area), &t);
    eqn.add_su(&[2.0; 4]);

    monolithic_solve::solve(
        &mut [&mut eqn],
        &mut [&mut t],
        &controls(),
        false,
        false,
        &mut SuperMeshRegistry::new(),
        &SerialCommunicator::new(),
    )
    .unwrap();
    assert_approx_eq_vec(t.internal(), &[2.0; 4], 1e-9);
}

#[test]
fn test_mismatched_matrix_and_field_rejected() {
    let (solid, fluid) = coupled_pair(1);
    let (mut ts, tf) = temperatures(&solid, &fluid);
    let mut mf = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);
    let result = monolithic_solve::solve(
        &mut [&mut mf],
        &mut [&mut ts],
        &controls(),
        false,
        false,
        &mut SuperMeshRegistry::new(),
        &SerialCommunicator::new(),
    );
    assert!(matches!(result, Err(FvError::FieldError(_))));
}
