pub mod traits;
pub mod genes;
pub mod evolution;
pub mod fitness;
pub mod risk;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use genes::{GeneDefinition, GeneSpaceConfig, STRATEGY_GENES};
pub use evolution::EvolutionConfig;
pub use fitness::{FitnessConfig, FitnessWeights, SimulationConfig};
pub use risk::{RiskConfig, RiskLimits, RiskWeights};
pub use traits::ConfigSection;
