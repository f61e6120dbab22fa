//! Configuration management for the factdb system.
//!
//! Two concerns: finding the `.factdb/` directory that anchors a store, and
//! layering configuration from `config.yaml` plus `FACTDB_*` environment
//! overrides.

pub mod config;
pub mod factdb_dir;

pub use config::{Config, ConfigError, load_config, save_config};
pub use factdb_dir::{ensure_factdb_dir, find_factdb_dir, find_factdb_dir_or_error};
