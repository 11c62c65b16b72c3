//! Shared HTTP plumbing for the proxy and DLP adapters

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
