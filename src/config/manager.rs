use super::{
    evolution::EvolutionConfig,
    fitness::FitnessConfig,
    genes::GeneSpaceConfig,
    risk::RiskConfig,
    traits::ConfigSection,
};
use crate::error::EvoError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Prefix for environment overrides, e.g. `EVOGUARD__EVOLUTION__POPULATION_SIZE=80`.
pub const ENV_PREFIX: &str = "EVOGUARD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub genes: GeneSpaceConfig,
    pub evolution: EvolutionConfig,
    pub fitness: FitnessConfig,
    pub risk: RiskConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvoError> {
        self.genes.validate()?;
        self.evolution.validate()?;
        self.fitness.validate()?;
        self.risk.validate()?;
        Ok(())
    }
}

/// Holds the startup configuration. Components take a snapshot through
/// [`ConfigManager::get`]; a reload only affects schedulers built afterwards.
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EvoError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        log::info!(
            "Loaded configuration from {} ({} genes, population {})",
            path.display(),
            config.genes.genes.len(),
            config.evolution.population_size
        );
        *self.config.write() = config;
        Ok(())
    }

    pub fn load_from_str(&self, contents: &str) -> Result<(), EvoError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| EvoError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let config = self.config.read();
        let toml_str = toml::to_string_pretty(&*config)
            .map_err(|e| EvoError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| EvoError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn update<F>(&self, f: F) -> Result<(), EvoError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.config.read().clone();
        f(&mut candidate);
        candidate.validate()?;
        *self.config.write() = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let manager = ConfigManager::new();
        manager
            .load_from_str(
                r#"
                [evolution]
                population_size = 12
                num_generations = 3
                mutation_rate = 0.2
                mutation_strength = 0.1
                crossover_rate = 0.5
                elitism_fraction = 0.25
                convergence_threshold = 0.0
                convergence_patience = 2
                worker_threads = 1
                evaluation_timeout_ms = 1000
                hall_of_fame_size = 3
                "#,
            )
            .unwrap();

        let config = manager.get();
        assert_eq!(config.evolution.population_size, 12);
        assert_eq!(config.genes.genes.len(), 10);
        assert_eq!(config.risk.limits.max_drawdown, 0.2);
    }

    #[test]
    fn test_invalid_update_is_not_applied() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.evolution.population_size = 0);
        assert!(result.is_err());
        assert_eq!(manager.get().evolution.population_size, 50);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evoguard.toml");

        let manager = ConfigManager::new();
        manager.update(|c| c.risk.limits.position_limit = 0.3).unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().risk.limits.position_limit, 0.3);
    }
}
