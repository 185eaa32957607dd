use helyx_fv::fvm::{self, Dimensioned};
use helyx_fv::{DimensionSet, FvMatrix, FvMesh, SolverControls, Vector, VolField};
use std::sync::Arc;

fn assert_approx_eq(a: f64, b: f64, tolerance: f64) {
    assert!((a - b).abs() <= tolerance, "expected {}, got {}", b, a);
}

fn rod(n: usize) -> Arc<FvMesh> {
    Arc::new(FvMesh::one_dimensional("rod", n, 1.0, 1.0).unwrap())
}

fn controls() -> SolverControls {
    SolverControls::new("PCG").with_tolerance(1e-12, 0.0).with_max_iter(200)
}

/// Cell centres of `rod(n)`.
fn centres(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 + 0.5) / n as f64).collect()
}

#[test]
fn test_vector_components_solved_in_turn() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mesh = rod(4);
    let mut u: VolField<Vector> = VolField::uniform("U", Arc::clone(&mesh), DimensionSet::velocity(), [0.0; 3]);
    u.set_fixed_value("left", [0.0; 3]).unwrap();
    u.set_fixed_value("right", [1.0, 2.0, 3.0]).unwrap();

    let mut eqn = fvm::laplacian(Dimensioned::dimensionless(1.0), &u);
    let perf = eqn.solve(&mut u, &controls()).unwrap();

    assert!(perf.converged);
    for (value, x) in u.internal().iter().zip(centres(4)) {
        for cmpt in 0..3 {
            assert_approx_eq(value[cmpt], x * (cmpt + 1) as f64, 1e-9);
        }
    }
    assert_eq!(mesh.performance().get("U").len(), 1);

    let residual = eqn.residual(&u).unwrap();
    assert!(residual.iter().flatten().all(|r| r.abs() < 1e-9));
}

#[test]
fn test_converged_field_satisfies_a_psi_equals_h() {
    let mesh = rod(5);
    let mut t = VolField::uniform("T", Arc::clone(&mesh), DimensionSet::temperature(), 0.0);
    t.set_fixed_value("left", 1.0).unwrap();
    t.set_fixed_value("right", 3.0).unwrap();

    let mut eqn = fvm::laplacian(Dimensioned::dimensionless(2.0), &t);
    eqn *= -1.0;
    eqn.solve(&mut t, &controls()).unwrap();

    let a = eqn.a();
    let h = eqn.h(&t).unwrap();
    for cell in 0..mesh.n_cells() {
        assert_approx_eq(a[cell] * t.internal()[cell], h[cell], 1e-8);
    }
}

#[test]
fn test_explicit_part_of_su_sp_uses_assembly_values() {
    let mesh = rod(2);
    let t = VolField::uniform("T", Arc::clone(&mesh), DimensionSet::temperature(), 4.0);
    let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
    let psi = eqn.psi_values().to_vec();
    eqn.add_su_sp(&[2.0, -2.0], &psi);

    // cell volume 0.5
    assert_eq!(eqn.diag(), &[1.0, 0.0]);
    assert_eq!(eqn.source(), &[0.0, 4.0]);
}

#[test]
fn test_constrained_cell_keeps_its_value() {
    let mesh = rod(3);
    let mut t = VolField::uniform("T", Arc::clone(&mesh), DimensionSet::temperature(), 0.0);
    t.set_fixed_value("left", 0.0).unwrap();
    t.set_fixed_value("right", 0.0).unwrap();

    let mut eqn = fvm::laplacian(Dimensioned::dimensionless(1.0), &t);
    eqn.set_values(&mut t, &[1], &[6.0]);
    eqn.solve(&mut t, &controls()).unwrap();

    // each outer cell sits between a wall at 0 and the constrained cell
    assert_approx_eq(t.internal()[1], 6.0, 1e-9);
    assert_approx_eq(t.internal()[0], 2.0, 1e-9);
    assert_approx_eq(t.internal()[2], 2.0, 1e-9);
}

#[test]
#[should_panic(expected = "incompatible fields")]
fn test_adding_matrices_of_different_fields_is_fatal() {
    let mesh = rod(2);
    let t = VolField::uniform("T", Arc::clone(&mesh), DimensionSet::temperature(), 0.0);
    let p = VolField::uniform("p", Arc::clone(&mesh), DimensionSet::temperature(), 0.0);
    let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
    eqn += &FvMatrix::new(&p, DimensionSet::temperature());
}
