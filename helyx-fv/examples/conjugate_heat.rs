use helyx_core::SerialCommunicator;
use helyx_fv::fvm::{self, Dimensioned};
use helyx_fv::monolithic_solve;
use helyx_fv::{Dictionary, DimensionSet, FvMesh, OptionList, OptionRegistry, SolverControls, SuperMeshRegistry, VolField};
use std::sync::Arc;

type ExampleError = Box<dyn std::error::Error>;

/// A heated solid slab against a fluid slab, both ends held at 300 K,
/// solved as one system.
fn main() -> Result<(), ExampleError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n = 20;
    let solid = Arc::new(FvMesh::one_dimensional("solid", n, 0.5, 1.0)?.couple_region("right", "fluid", "left")?);
    let fluid = Arc::new(FvMesh::one_dimensional("fluid", n, 0.5, 1.0)?.couple_region("left", "solid", "right")?);

    let mut ts = VolField::uniform("T", Arc::clone(&solid), DimensionSet::temperature(), 300.0);
    let mut tf = VolField::uniform("T", Arc::clone(&fluid), DimensionSet::temperature(), 300.0);
    ts.set_fixed_value("left", 300.0)?;
    tf.set_fixed_value("right", 300.0)?;

    let fv_options = Dictionary::from_json_str(
        "fvOptions",
        r#"{"heater": {"type": "semiImplicitSource", "active": true,
            "semiImplicitSourceCoeffs": {"volumeMode": "specific", "injectionRateSuSp": {"T": [400.0, 0.0]}}}}"#,
    )?;
    let mut options = OptionList::new(&solid, &fv_options, &OptionRegistry::with_defaults())?;

    let mut solid_eqn = fvm::laplacian(Dimensioned::dimensionless(5.0), &ts);
    solid_eqn.negate();
    let heating = options.sources(&ts, *solid_eqn.dimensions())?;
    solid_eqn -= &heating;

    let mut fluid_eqn = fvm::laplacian(Dimensioned::dimensionless(1.0), &tf);
    fluid_eqn.negate();

    let controls = SolverControls::new("PCG").with_tolerance(1e-10, 0.0).with_max_iter(1000);
    let perf = monolithic_solve::solve(
        &mut [&mut solid_eqn, &mut fluid_eqn],
        &mut [&mut ts, &mut tf],
        &controls,
        false,
        false,
        &mut SuperMeshRegistry::new(),
        &SerialCommunicator::new(),
    )?;
    options.check_applied();

    log::info!("{}", perf);
    println!("\n======================================");
    println!("Interface temperature: {:.3}", ts.boundary()[1].value()[0]);
    println!("Solid mean: {:.3}", ts.weighted_average());
    println!("Fluid mean: {:.3}", tf.weighted_average());
    println!("======================================");
    Ok(())
}
