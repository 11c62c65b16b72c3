//! Shared infrastructure primitives for the Tidemark crates.
//!
//! # Feature Tiers
//!
//! - `platform`: encrypted SQLite storage (SQLCipher pool, pooled connection
//!   wrapper, per-connection cipher setup, storage errors)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "platform")]
pub mod storage;

#[cfg(feature = "platform")]
pub use storage::{SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig, StorageError};
