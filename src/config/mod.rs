// src/config/mod.rs

//! Harness configuration: `DfuHarness.toml` plus the `DFU` and `TARGET`
//! environment overrides.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{EnvOverrides, HarnessConfig, LockSection, RawConfigFile, ToolSection};
