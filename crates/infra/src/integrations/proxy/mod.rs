//! Provider proxy integration

mod client;
mod wire;

pub use client::ProviderProxyClient;
