//! SQLCipher backend implementation
//!
//! Provides an r2d2-based connection pool for SQLCipher encrypted databases.

pub mod cipher;
pub mod config;
pub mod connection;
pub mod pool;

pub use cipher::{prepare_connection, verify_encryption};
pub use config::SqlCipherPoolConfig;
pub use connection::{SqlCipherConnection, SqlCipherStatement};
pub use pool::{HealthStatus, SqlCipherPool};
