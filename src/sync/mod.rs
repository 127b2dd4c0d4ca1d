//! Keeping the mirrored tree in step with the remote store.
//!
//! # Overview
//!
//! A [`Snapshot`] pairs the whole remote tree with its [`FingerprintMap`].
//! Snapshots come from the [`SnapshotAssembler`], which re-reads everything on
//! each call. The [`SyncContext`] owns the single cached snapshot and the
//! [`Broadcaster`] that pushes new snapshots to subscribers.
//!
//! Two things produce new snapshots:
//!
//! - The [`PollScheduler`], which runs one refresh per interval and only
//!   caches and broadcasts when the fingerprints changed.
//! - The [`MutationCoordinator`], which writes to the remote store and then
//!   forces a refresh so subscribers see the change straight away.

mod assembler;
mod broadcaster;
mod content;
mod context;
mod error;
mod fingerprint;
mod mutation;
mod node;
mod poller;
mod tree_reader;

pub use assembler::SnapshotAssembler;
pub use broadcaster::{BroadcastOutcome, Broadcaster, Payload, SubscriberId, Subscription};
pub use content::{decode_content, encode_content, ContentFormat};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use fingerprint::{changed, FingerprintMap};
pub use mutation::{MutationCoordinator, MutationOutcome};
pub use node::{DirectoryNode, FileNode, Node, Snapshot};
pub use poller::PollScheduler;
pub use tree_reader::TreeReader;
