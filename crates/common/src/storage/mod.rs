//! Storage primitives for encrypted databases
//!
//! This module provides the SQLCipher connection pool used by every
//! repository adapter, plus the storage error type.

pub mod error;
pub mod secret;
pub mod sqlcipher;

pub use error::{StorageError, StorageResult};
pub use secret::SecretKey;
pub use sqlcipher::{
    HealthStatus, SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig, SqlCipherStatement,
};
