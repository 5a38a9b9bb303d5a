//! Network infrastructure for the bridge.
//!
//! # Sub-modules
//!
//! - **`osc_listener`** – Binds the inbound UDP port, decodes OSC datagrams
//!   and hands every message to the command router on its own task.
//!
//! - **`osc_sender`** – The outbound UDP link to the control surface; the
//!   status publisher writes through it.

pub mod osc_listener;
pub mod osc_sender;

pub use osc_listener::{ListenError, OscListener};
pub use osc_sender::{SenderError, UdpOscSender};
