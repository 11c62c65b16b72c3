//! # Tidemark Domain
//!
//! Business domain types for the calendar/mail sync pipeline.
//!
//! This crate contains:
//! - Connection, sync status and record types
//! - Domain error type and Result definition
//! - Configuration structures
//! - Pipeline constants
//!
//! ## Architecture
//! - No dependencies on other Tidemark crates
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
