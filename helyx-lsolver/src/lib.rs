//! `helyx-lsolver`: linear solvers for LDU and block LDU matrices.
//!
//! Solvers are selected at run time from [`SolverControls`] and operate on
//! rank-local rows; coupled interfaces and global reductions make the same
//! solve correct on one rank or many.

// Core modules
pub mod algorithms;
pub mod controls;
pub mod dense_matrix;
pub mod preconditioner;
pub mod solver_performance;

pub use algorithms::{new_solver, BlockGaussSeidel, LduSolver, SolverInputs};
pub use controls::SolverControls;
pub use dense_matrix::DenseMatrix;
pub use preconditioner::{new_preconditioner, Preconditioner};
pub use solver_performance::SolverPerformance;

// Re-export from helyx_core
pub use helyx_core::{
    BlockLduMatrix, Communicator, GlobalReduce, HelyxCoreError, LduAddressing, LduInterfaceField,
    LduInterfaceFieldPtrs, LduMatrix, Matrix, SerialCommunicator, SparseMatrix,
};
