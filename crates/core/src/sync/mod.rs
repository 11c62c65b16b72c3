//! Sync pipeline: fetch, secure, persist, analyze, commit

pub mod dispatcher;
pub mod fetcher;
pub mod orchestrator;
pub mod poller;
pub mod ports;
