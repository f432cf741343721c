pub mod checkpoint;
pub mod error;
pub mod random;
pub mod shared_list;
pub mod weighted;
#[cfg(test)]
mod tests;

pub use checkpoint::{CheckpointMultiMap, CheckpointSet};
pub use error::{CheckpointError, SamplerError};
pub use random::RandomSource;
pub use shared_list::SharedList;
pub use weighted::{WeightedList, WeightedSampler, WeightedTree};
