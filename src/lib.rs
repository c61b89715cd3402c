pub mod cli;
pub mod command;
pub mod config;
pub mod decision;
pub mod error;
pub mod forge;
pub mod lock;
pub mod orchestrator;
pub mod pipeline;
pub mod process;
pub mod publisher;
pub mod repo;
pub mod requests;
pub mod state;

pub use cli::Args;
pub use error::{BuildBotError, Result};
pub use orchestrator::RunSummary;

#[cfg(test)]
pub mod test_helpers;
