// src/config/mod.rs

//! Configuration loading and validation for infraflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk, falling back to defaults (`loader.rs`).
//! - Validate and resolve it into typed settings (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ApplySettings, ConfigFile, ConfigSection, PreliminarySettings, RawApplySection,
    RawConfigFile, RawPreliminarySection, RawRetrySection,
};
