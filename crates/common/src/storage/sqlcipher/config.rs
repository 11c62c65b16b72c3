//! SQLCipher connection pool configuration

use std::time::Duration;

/// Pool sizing and connection timeouts
#[derive(Debug, Clone)]
pub struct SqlCipherPoolConfig {
    /// Maximum number of pooled connections
    pub max_size: u32,

    /// How long `get` waits for a free connection
    pub connection_timeout: Duration,

    /// SQLite busy timeout applied to every connection
    pub busy_timeout: Duration,
}

impl SqlCipherPoolConfig {
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }
}

impl Default for SqlCipherPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}
