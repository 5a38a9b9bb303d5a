//! Automation backends for the presentation application.
//!
//! - **`keynote`** – drives Keynote through `osascript` child processes.
//!   Only functional on macOS; elsewhere every call fails with a generic
//!   automation error, which the controller records in the snapshot.
//!
//! - **`mock`** – a scripted backend that records calls and simulates a deck,
//!   used by unit and integration tests.

pub mod keynote;
pub mod mock;

pub use keynote::OsascriptBackend;
pub use mock::{BackendCall, ScriptedBackend};
