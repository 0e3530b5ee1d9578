//! CLI commands

pub mod config;
pub mod evaluate;
pub mod inspect;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
