//! Domain layer: pure values with no I/O.
//!
//! - [`snapshot`] – the presentation status and partial updates to it.
//! - [`config`] – the immutable bridge configuration and its partial update.
//! - [`command`] – the closed set of inbound commands and their parser.

pub mod command;
pub mod config;
pub mod snapshot;

pub use command::{Command, CommandError};
pub use config::{BridgeConfig, ConfigUpdate};
pub use snapshot::{PresentationEntry, Snapshot, SnapshotUpdate};
