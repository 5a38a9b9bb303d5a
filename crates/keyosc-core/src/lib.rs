//! # keyosc-core
//!
//! Shared library for KeyOSC containing the OSC wire codec, the presentation
//! status snapshot, the bridge configuration value and the inbound command
//! parser.
//!
//! It has zero dependencies on sockets, processes, or the host presentation
//! application.
//!
//! # Architecture overview
//!
//! KeyOSC is a bridge between a show-control surface (for example Bitfocus
//! Companion) and a presentation application.  The surface sends OSC
//! messages such as `/keyosc/next`; the bridge drives the presentation and
//! answers with status messages such as `/keyosc/keynote_current_slide/value`.
//!
//! - **`protocol`** – How bytes travel over UDP.  OSC 1.0 messages and
//!   bundles are encoded into 4-byte aligned packets and decoded back into
//!   typed Rust values.
//!
//! - **`domain`** – Pure values: the status [`Snapshot`] and its partial
//!   [`SnapshotUpdate`], the immutable [`BridgeConfig`], and the closed
//!   [`Command`] enum parsed from inbound messages.

pub mod domain;
pub mod protocol;

pub use domain::command::{Command, CommandError};
pub use domain::config::{BridgeConfig, ConfigUpdate};
pub use domain::snapshot::{PresentationEntry, Snapshot, SnapshotUpdate};
pub use protocol::codec::{decode_packet, encode_message, flatten_packet, OscError};
pub use protocol::messages::{OscArg, OscMessage, OscPacket};
