//! CLI for replaying exported pump logs through the reconstruction engine.
//!
//! The live upload path feeds the engine straight from a device driver; this
//! crate covers the batch path, where therapy events recovered from exported
//! CSV logs are replayed through the same reconstruction logic, one engine
//! per device.

mod cli;
pub mod commands;
mod config;
pub mod rows;

pub use cli::{Cli, Commands};
pub use config::Config;
