//! Calendar events: storage port, conflict detection, event commands

pub mod commands;
pub mod conflict;
pub mod ports;
