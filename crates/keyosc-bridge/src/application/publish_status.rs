//! StatusPublisher: serialises snapshots into the outbound OSC namespace.
//!
//! On every store notification the publisher sends five messages to the
//! control surface:
//!
//! ```text
//! <ns>/keynote_document/value        "Deck.key" | "No document"
//! <ns>/keynote_current_slide/value   3
//! <ns>/keynote_total_slides/value    12
//! <ns>/keynote_playing/value         "1" | "0"
//! <ns>/keynote_status/value          {"document":"Deck.key",...}
//! ```
//!
//! A presentation listing adds `<ns>/presentation/<index>` per entry and one
//! `<ns>/presentations` JSON array.
//!
//! The outbound socket is swapped by the orchestrator on reconfiguration, so
//! the publisher holds it in a replaceable slot.  Publishing while the slot
//! is empty fails with [`PublishError::NotConnected`]; the logging wrappers
//! turn every failure into a `warn!` line and never propagate it.

use std::sync::{Arc, PoisonError, RwLock};

use keyosc_core::{OscArg, OscError, OscMessage, PresentationEntry, Snapshot};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::state_store::{StateStore, Subscription};

/// Document payload sent when nothing is open.
pub const NO_DOCUMENT_PLACEHOLDER: &str = "No document";

/// Error type for outbound publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("outbound link is not connected")]
    NotConnected,

    #[error("failed to encode OSC message: {0}")]
    Encode(#[from] OscError),

    #[error("failed to serialise payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fire-and-forget destination for outbound OSC messages.
pub trait OscSink: Send + Sync {
    fn send(&self, message: &OscMessage) -> Result<(), PublishError>;
}

pub struct StatusPublisher {
    namespace: RwLock<String>,
    sink: RwLock<Option<Arc<dyn OscSink>>>,
}

impl StatusPublisher {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: RwLock::new(normalise_namespace(namespace)),
            sink: RwLock::new(None),
        }
    }

    pub fn namespace(&self) -> String {
        self.namespace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_namespace(&self, namespace: &str) {
        *self.namespace.write().unwrap_or_else(PoisonError::into_inner) =
            normalise_namespace(namespace);
    }

    /// Installs `sink` as the outbound link, replacing any previous one.
    pub fn connect(&self, sink: Arc<dyn OscSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Removes the outbound link and returns it.
    pub fn disconnect(&self) -> Option<Arc<dyn OscSink>> {
        self.sink
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_connected(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Builds the five status messages for `snapshot`.
    pub fn status_messages(&self, snapshot: &Snapshot) -> Result<Vec<OscMessage>, PublishError> {
        let ns = self.namespace();
        let document = snapshot
            .document
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(NO_DOCUMENT_PLACEHOLDER);
        let playing = if snapshot.playing { "1" } else { "0" };

        Ok(vec![
            OscMessage::with_arg(format!("{ns}/keynote_document/value"), document),
            OscMessage::with_arg(
                format!("{ns}/keynote_current_slide/value"),
                slide_arg(snapshot.current_slide),
            ),
            OscMessage::with_arg(
                format!("{ns}/keynote_total_slides/value"),
                slide_arg(snapshot.total_slides),
            ),
            OscMessage::with_arg(format!("{ns}/keynote_playing/value"), playing),
            OscMessage::with_arg(
                format!("{ns}/keynote_status/value"),
                serde_json::to_string(snapshot)?,
            ),
        ])
    }

    /// Builds one message per entry plus the aggregate JSON list.
    pub fn presentation_messages(
        &self,
        entries: &[PresentationEntry],
    ) -> Result<Vec<OscMessage>, PublishError> {
        let ns = self.namespace();
        let mut messages: Vec<OscMessage> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                OscMessage::with_arg(format!("{ns}/presentation/{index}"), entry.name.as_str())
            })
            .collect();
        messages.push(OscMessage::with_arg(
            format!("{ns}/presentations"),
            serde_json::to_string(entries)?,
        ));
        Ok(messages)
    }

    pub fn try_publish_snapshot(&self, snapshot: &Snapshot) -> Result<(), PublishError> {
        let messages = self.status_messages(snapshot)?;
        self.send_all(&messages)
    }

    /// Publishes `snapshot`, logging instead of returning failures.
    pub fn publish_snapshot(&self, snapshot: &Snapshot) {
        match self.try_publish_snapshot(snapshot) {
            Ok(()) => debug!(
                slide = snapshot.current_slide,
                playing = snapshot.playing,
                "published status"
            ),
            Err(e) => warn!(error = %e, "failed to publish status"),
        }
    }

    pub fn try_publish_presentations(
        &self,
        entries: &[PresentationEntry],
    ) -> Result<(), PublishError> {
        let messages = self.presentation_messages(entries)?;
        self.send_all(&messages)
    }

    pub fn publish_presentations(&self, entries: &[PresentationEntry]) {
        match self.try_publish_presentations(entries) {
            Ok(()) => debug!(count = entries.len(), "published presentation list"),
            Err(e) => warn!(error = %e, "failed to publish presentation list"),
        }
    }

    /// Publishes every future snapshot of `store`.
    pub fn subscribe(self: &Arc<Self>, store: &Arc<StateStore>) -> Subscription {
        let publisher = Arc::clone(self);
        store.on_state_change(move |snapshot| {
            publisher.publish_snapshot(snapshot);
            Ok(())
        })
    }

    /// Sends every message, continuing past failures; returns the first one.
    fn send_all(&self, messages: &[OscMessage]) -> Result<(), PublishError> {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PublishError::NotConnected)?;

        let mut first_error = None;
        for message in messages {
            if let Err(e) = sink.send(message) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn normalise_namespace(namespace: &str) -> String {
    namespace.trim_end_matches('/').to_string()
}

fn slide_arg(value: u32) -> OscArg {
    OscArg::Int(i32::try_from(value).unwrap_or(i32::MAX))
}

// ── Test double ───────────────────────────────────────────────────────────────

/// Recording sink for tests.
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};

    use keyosc_core::OscMessage;

    use super::{OscSink, PublishError};

    /// An [`OscSink`] that stores every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingSink {
        sent: Mutex<Vec<OscMessage>>,
        failing: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent send fail with an I/O error.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<OscMessage> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// The most recent message sent to `address`.
        pub fn last_to(&self, address: &str) -> Option<OscMessage> {
            self.sent()
                .into_iter()
                .rev()
                .find(|m| m.address == address)
        }

        pub fn clear(&self) {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    impl OscSink for RecordingSink {
        fn send(&self, message: &OscMessage) -> Result<(), PublishError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PublishError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "recording sink set to fail",
                )));
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
