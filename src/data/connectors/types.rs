use serde::{Deserialize, Serialize};

/// Columns read from a market data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketColumn {
    Timestamp,
    Price,
    ImpliedVol,
    Spread,
    Depth,
}

impl MarketColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Price => "price",
            Self::ImpliedVol => "implied_vol",
            Self::Spread => "spread",
            Self::Depth => "depth",
        }
    }

    pub fn required() -> Vec<Self> {
        vec![Self::Timestamp, Self::Price, Self::ImpliedVol]
    }

    pub fn optional() -> Vec<Self> {
        vec![Self::Spread, Self::Depth]
    }

    /// Common alternative column names
    pub fn aliases(&self) -> Vec<&'static str> {
        match self {
            Self::Timestamp => vec!["timestamp", "Timestamp", "ts", "time", "datetime"],
            Self::Price => vec!["price", "Price", "close", "Close", "underlying", "c"],
            Self::ImpliedVol => vec!["implied_vol", "iv", "IV", "implied_volatility", "atm_iv"],
            Self::Spread => vec!["spread", "Spread", "bid_ask_spread"],
            Self::Depth => vec!["depth", "Depth", "book_depth", "volume"],
        }
    }
}

/// Summary of a loaded market data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub file_path: String,
    pub symbol: String,
    pub num_rows: usize,
    pub columns: Vec<String>,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
    pub price_range: (f64, f64),
    pub null_counts: Vec<(String, usize)>,
}
