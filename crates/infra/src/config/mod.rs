//! Configuration loading
//!
//! Environment variables take precedence; otherwise the first config file
//! found on the probe path is used.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
