//! Infrastructure layer for the bridge.
//!
//! Contains the OS-facing adapters: UDP sockets, the `osascript` automation
//! backend, file-system storage, the log ring buffer, and the orchestrator
//! that owns the socket lifecycle.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keyosc_core`, but MUST NOT be imported by the `application` layer.

pub mod automation;
pub mod logging;
pub mod network;
pub mod orchestrator;
pub mod storage;
