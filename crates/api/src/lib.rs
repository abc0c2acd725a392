//! # RelayPost App
//!
//! Application layer - CLI commands and main entry point.
//!
//! This crate contains:
//! - CLI definition and command handlers
//! - Application context (dependency injection)
//! - Logging initialisation
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod cli;
pub mod commands;
pub mod context;
pub mod utils;

pub use cli::{Cli, Command, TargetCommand};
pub use context::AppContext;
