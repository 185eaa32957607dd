//! Message passing between the ranks of a decomposed case.

pub mod comm;
pub mod distribution_map;
pub mod thread_comm;
pub mod util;

pub use comm::{list_unique_union, Communicator, GlobalReduce};
pub use distribution_map::DistributionMap;
pub use thread_comm::{SerialCommunicator, ThreadCommunicator};
