//! Command-line front end for civdl.
//!
//! `civdl serve` runs the HTTP API; `civdl status` polls a running server
//! and prints the download table.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the binary only
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use commands::Commands;
pub use parser::Cli;
