//! Application layer of the bridge.
//!
//! Everything here depends on traits and `keyosc_core` values only; sockets,
//! child processes and the file system are injected from `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`state_store`** – Owns the status snapshot, detects `playing` edges,
//!   runs the polling timer and notifies listeners.
//!
//! - **`control_presentation`** – Presentation actions on top of an
//!   [`AutomationBackend`](control_presentation::AutomationBackend), each
//!   followed by a sequenced status refresh.
//!
//! - **`route_command`** – Turns inbound OSC messages into actions and keeps
//!   every failure inside the message that caused it.
//!
//! - **`publish_status`** – Serialises snapshots and presentation lists into
//!   the outbound OSC namespace.

pub mod control_presentation;
pub mod publish_status;
pub mod route_command;
pub mod state_store;
