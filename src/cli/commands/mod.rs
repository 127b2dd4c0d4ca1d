//! Subcommand implementations.

pub mod mutate;
pub mod serve;
pub mod snapshot;
pub mod watch;
