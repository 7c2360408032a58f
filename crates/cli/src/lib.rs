//! Command-line client for tether.

pub mod cli;
pub mod commands;
pub mod logging;
