pub mod fitness;
pub mod simulator;

pub use fitness::{Evaluation, EvaluationFailure, FitnessEvaluator, FitnessResult, WORST_FITNESS};
pub use simulator::{OptionsBook, SymbolRun};
