//! PolishKit Settings Crate
//!
//! Typed pipeline configuration, TOML/JSON persistence, and the validated
//! [`GenerationContext`] handed to the planner and the code generator.

pub mod config;
pub mod error;

pub use config::{default_config_path, GenerationContext, PipelineConfig, StageSettings};
pub use error::{SettingsError, SettingsResult};
