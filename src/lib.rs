pub mod archive;
pub mod cache;
pub mod cache_gate;
pub mod cagr;
pub mod composer;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod model_store;
pub mod stats;
pub mod trainer;
pub mod training;

pub use error::{ForecastError, ForecastResult};
