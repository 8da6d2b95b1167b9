pub mod evolution_engine;
pub mod gene_model;
pub mod genome;
pub mod hall_of_fame;
pub mod history;
pub mod operators;
pub mod population;
pub mod progress;

pub use evolution_engine::{
    CancellationToken, EvolutionScheduler, GenerationOutcome, GenerationReport, ProgressCallback,
    RunSummary, TerminationReason,
};
pub use gene_model::{GeneSpace, ParameterSet, StrategyParams};
pub use genome::Genome;
pub use hall_of_fame::{EliteGenome, HallOfFame};
pub use history::{GenerationHistory, GenerationStats};
pub use population::{Population, PopulationManager};
pub use progress::{ChannelProgressCallback, LogProgressCallback, ProgressMessage};
