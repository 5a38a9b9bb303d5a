//! Presentation status snapshot and partial updates.
//!
//! A [`Snapshot`] is everything the bridge currently knows about the
//! presentation.  It is only ever changed by merging a [`SnapshotUpdate`]
//! into it: fields the update leaves as `None` keep their previous value.

use serde::{Deserialize, Serialize};

/// Current knowledge of the presentation.
///
/// Serialises with the camelCase keys the control surface expects, e.g.
/// `{"document":"Deck.key","currentSlide":3,"totalSlides":12,"playing":true,"polling":true}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Name of the front document, `None` when nothing is open.
    pub document: Option<String>,
    /// 1-based slide number, 0 when unknown.
    pub current_slide: u32,
    pub total_slides: u32,
    /// Whether a slideshow is running.
    pub playing: bool,
    /// Whether the polling timer is active.  Owned by the state store.
    pub polling: bool,
    /// Classification of the last failed status query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Snapshot {
    /// Returns a new snapshot with every present field of `update` applied.
    ///
    /// `polling` is never touched here; only the polling lifecycle sets it.
    pub fn merged(&self, update: &SnapshotUpdate) -> Snapshot {
        Snapshot {
            document: update
                .document
                .clone()
                .unwrap_or_else(|| self.document.clone()),
            current_slide: update.current_slide.unwrap_or(self.current_slide),
            total_slides: update.total_slides.unwrap_or(self.total_slides),
            playing: update.playing.unwrap_or(self.playing),
            polling: self.polling,
            error: update.error.clone().unwrap_or_else(|| self.error.clone()),
        }
    }
}

/// A partial snapshot.
///
/// `document` and `error` are tri-state: `None` leaves the field alone,
/// `Some(None)` clears it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotUpdate {
    pub document: Option<Option<String>>,
    pub current_slide: Option<u32>,
    pub total_slides: Option<u32>,
    pub playing: Option<bool>,
    pub error: Option<Option<String>>,
}

impl SnapshotUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty/zero defaults plus an error reason.
    ///
    /// Used when the host application is not running or has no document.
    pub fn reset(reason: impl Into<String>) -> Self {
        Self {
            document: Some(None),
            current_slide: Some(0),
            total_slides: Some(0),
            playing: Some(false),
            error: Some(Some(reason.into())),
        }
    }

    /// A successful observation of the host application; clears any error.
    pub fn observed(
        document: impl Into<String>,
        current_slide: u32,
        total_slides: u32,
        playing: bool,
    ) -> Self {
        Self {
            document: Some(Some(document.into())),
            current_slide: Some(current_slide),
            total_slides: Some(total_slides),
            playing: Some(playing),
            error: Some(None),
        }
    }

    /// Sets only the error field, keeping the last known document fields.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            error: Some(Some(reason.into())),
            ..Self::default()
        }
    }

    pub fn document(mut self, document: Option<String>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn current_slide(mut self, slide: u32) -> Self {
        self.current_slide = Some(slide);
        self
    }

    pub fn total_slides(mut self, total: u32) -> Self {
        self.total_slides = Some(total);
        self
    }

    pub fn playing(mut self, playing: bool) -> Self {
        self.playing = Some(playing);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns `true` if applying this update cannot change anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One presentation file found in the content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationEntry {
    /// File name including the `.key` extension.
    pub name: String,
    /// Absolute or content-root-relative path as listed.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time in seconds since the Unix epoch.
    pub modified: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
