//! Subcommand implementations.

pub mod chat;
pub mod dataset;
pub mod init;
pub mod status;
