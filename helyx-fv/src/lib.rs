//! # Helyx finite-volume layer
//!
//! Region meshes and their fields, finite-volume matrices with boundary
//! coefficients, block-coupled vector systems, run-time selectable source
//! options, the monolithic solve of coupled regions and the redistribution
//! of Lagrangian fields between ranks.

// Declare modules
pub mod error;
pub mod fv_block_matrix;
pub mod fv_matrix;
pub mod fv_mesh;
pub mod fv_options;
pub mod fvm;
pub mod monolithic_solve;
pub mod patch_field;
pub mod redistributor;
pub mod super_mesh;
pub mod vol_field;

// Re-export public types
pub use error::{FvError, OptionError, Result};
pub use fv_block_matrix::{BlockVectorSystem, block_laplacian, div_continuity, solve_block};
pub use fv_matrix::FvMatrix;
pub use fv_mesh::{FvMesh, FvPatch, InternalFaces, PatchKind, PerformanceRegistry};
pub use fv_options::{
    AsEquation, Equation, ExecHook, FieldMut, FvOption, OptionBase, OptionConstructor, OptionList, OptionRegistry,
    Selection,
};
pub use fvm::Dimensioned;
pub use patch_field::{PatchField, PatchFieldKind};
pub use redistributor::{
    CompactIoField, IoContainer, IoField, IoObject, LagrangianRedistributor, MemoryObjectStore, ObjectStore,
};
pub use super_mesh::{SuperGeometry, SuperMeshRegistry, SuperTopology};
pub use vol_field::{SurfaceField, VolField, update_region_coupling};

// Re-export from helyx_core and helyx_lsolver
pub use helyx_core::{Dictionary, DimensionSet, FieldValue, Vector};
pub use helyx_lsolver::{SolverControls, SolverPerformance};
