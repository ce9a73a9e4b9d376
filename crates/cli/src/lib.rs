//! Host process for the umbra orchestrator.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
