pub mod accumulator;
pub mod chart;
pub mod config;
pub mod errors;
pub mod models;
pub mod storage;
pub mod strava;
pub mod tracker;

pub use accumulator::accumulate;
pub use config::{Config, Settings};
pub use storage::{CsvLogStore, LogStore, MemoryLogStore};
pub use strava::StravaClient;
