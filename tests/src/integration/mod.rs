//! Integration tests across the gateway crates.

pub mod harness;

mod cluster;
mod e2e_sessions;
