//! Command implementations.

pub mod cache;
pub mod common;
pub mod config;
pub mod resources;
pub mod telemetry;
pub mod update;
