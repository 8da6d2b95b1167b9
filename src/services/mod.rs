pub mod checkpoint;
pub mod evolution_runner;

pub use checkpoint::Checkpointer;
pub use evolution_runner::{EvolutionResult, EvolutionRunner};
