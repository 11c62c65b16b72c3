//! DLP redaction gate and its scanner/vault ports

pub mod gate;
pub mod ports;
