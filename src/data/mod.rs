pub mod connectors;
pub mod market;
pub mod synthetic;

pub use connectors::{CsvConnector, DataValidator, DatasetMetadata};
pub use market::{MarketBar, MarketDataWindow};
pub use synthetic::SyntheticMarket;
