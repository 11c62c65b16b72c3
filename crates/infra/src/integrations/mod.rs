//! External service integrations

pub mod dlp;
pub mod proxy;
