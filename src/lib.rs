//! tree-mirror - Mirror a remote repository's file tree and stream its changes.

pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod server;
pub mod sync;
pub mod telemetry;

pub use sync::{
    FingerprintMap, MutationCoordinator, MutationOutcome, Node, Snapshot, SyncContext, SyncError,
};
