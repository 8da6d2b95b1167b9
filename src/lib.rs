pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod execution;
pub mod services;
pub mod storage;
pub mod types;

pub use error::{EvoError, Result};
