//! # Tidemark App
//!
//! Application layer - composition root and command surface.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - Commands for polling callers (manual sync, status, event create/delete,
//!   connection lifecycle)
//! - The sync worker binary
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires the ports to their SQLCipher and HTTP adapters

pub mod commands;
pub mod context;
pub mod utils;

pub use commands::*;
pub use context::*;
