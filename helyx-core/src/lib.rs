//! # Helyx Core Library
//!
//! Provides the algebraic data structures shared by the linear solvers and
//! the finite-volume layer: LDU addressing, scalar and block LDU matrices,
//! coupled interfaces, block linear systems, face mapping across topology
//! changes, dictionaries and the message-passing layer between ranks.

// Declare modules
pub mod block_ldu_matrix;
pub mod block_ldu_system;
pub mod coeff_field;
pub mod dictionary;
pub mod dimension_set;
pub mod error;
pub mod face_mapper;
pub mod field;
pub mod interface;
pub mod ldu_addressing;
pub mod ldu_matrix;
pub mod ops;
pub mod parallel;
pub mod sparse_matrix;
pub mod traits;

// Re-export public types
pub use block_ldu_matrix::BlockLduMatrix;
pub use block_ldu_system::BlockLduSystem;
pub use coeff_field::{CoeffField, CoeffShape};
pub use dictionary::Dictionary;
pub use dimension_set::DimensionSet;
pub use error::{FatalError, HelyxCoreError};
pub use face_mapper::{AddressingKind, FaceMapper, ObjectMap, TopoChangeMap};
pub use field::{FieldValue, Scalar, SphericalTensor, SymmTensor, Tensor, Vector};
pub use interface::{
    CyclicLduInterfaceField, LduInterfaceField, LduInterfaceFieldPtrs, OffsetLduInterfaceField,
    ProcessorLduInterfaceField, RegionCoupledLduInterfaceField,
};
pub use ldu_addressing::LduAddressing;
pub use ldu_matrix::LduMatrix;
pub use parallel::{Communicator, DistributionMap, GlobalReduce, SerialCommunicator, ThreadCommunicator};
pub use sparse_matrix::{SparseMatrix, Triplete};

pub use traits::Matrix;
