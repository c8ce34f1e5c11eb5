pub mod core;
pub mod models;
pub mod reporter;

pub use crate::core::collector::{Collector, Snapshot};
pub use crate::core::engine::Engine;
pub use crate::models::config::Config;
pub use crate::models::result::BenchResult;
