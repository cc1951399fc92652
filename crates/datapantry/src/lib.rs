//! DataPantry command line support: configuration and migration plans.

pub mod config;
pub mod plan;

pub use config::PantryConfig;
pub use plan::{MigrationPlan, RenamePair};
