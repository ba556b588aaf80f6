//! bassist CLI library
//!
//! A host-side controller for the broadcast assistant: it speaks the framed
//! command/response/event protocol to a device bridge over TCP.

pub mod app;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;

pub use app::Printer;
pub use cli::{Cli, Commands};
pub use client::Client;
pub use config::CliConfig;
pub use error::{CliError, Result};
