//! Subcommand implementations.

pub mod authorize;
pub mod logout;
pub mod status;
pub mod token;
