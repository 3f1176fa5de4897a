//! Command line tool for the node mesh.
//!
//! Provides commands for:
//! - Generating and inspecting node ids
//! - Decoding error information of failed service calls
//! - Running a small in-memory mesh and printing its topology

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
