//! KeynoteController: presentation actions followed by a status refresh.
//!
//! The controller sits between the command router and the automation
//! backend.  Every action runs the backend call and then re-queries the
//! presentation so the store (and through it the control surface) converges
//! without waiting for the next polling tick.
//!
//! # Status classification
//!
//! | Backend outcome                | Snapshot change                          |
//! |--------------------------------|------------------------------------------|
//! | `Ok(status)`                   | all fields observed, error cleared       |
//! | `AdapterUnavailable`           | reset, error `"Keynote not running"`     |
//! | `NoDocument`                   | reset, error `"No document open"`        |
//! | `Failure(reason)`              | error only, last known fields kept       |
//!
//! A failed action is still followed by a refresh; the action's failure then
//! replaces whatever error the refresh produced, so the surface sees why the
//! command did not take effect.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use keyosc_core::{Snapshot, SnapshotUpdate};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::state_store::{StateStore, StatusRefresher};

/// Error reason published when the host application is not running.
pub const NOT_RUNNING_REASON: &str = "Keynote not running";
/// Error reason published when no document is open.
pub const NO_DOCUMENT_REASON: &str = "No document open";

/// What the host application reported about its front document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatus {
    pub document: String,
    pub current_slide: u32,
    pub total_slides: u32,
    pub playing: bool,
}

/// Error classification returned by an [`AutomationBackend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AutomationError {
    #[error("presentation application is not running")]
    AdapterUnavailable,
    #[error("no presentation document is open")]
    NoDocument,
    #[error("automation failed: {0}")]
    Failure(String),
}

/// Raw host-application automation.
///
/// The osascript implementation lives in the infrastructure layer; tests use
/// a scripted double.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn query_status(&self) -> Result<HostStatus, AutomationError>;
    async fn start_slideshow(&self) -> Result<(), AutomationError>;
    /// Activates the application, starts the slideshow and shows slide 1.
    async fn start_from_beginning(&self) -> Result<(), AutomationError>;
    async fn stop_slideshow(&self) -> Result<(), AutomationError>;
    async fn show_next(&self) -> Result<(), AutomationError>;
    async fn show_previous(&self) -> Result<(), AutomationError>;
    async fn show_slide(&self, slide: u32) -> Result<(), AutomationError>;
    async fn open(&self, path: PathBuf) -> Result<(), AutomationError>;
    /// Closes the front document without saving.
    async fn close_front_document(&self) -> Result<(), AutomationError>;
}

/// Failure of a presentation action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// Navigation was requested while no slideshow is running.
    #[error("no slideshow is playing")]
    NotPlaying,
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Presentation operations used by the command router.
///
/// Each action returns the snapshot produced by the refresh that follows it.
/// A failed action is refreshed too, with the failure recorded in the
/// snapshot's `error` before the error is returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresentationControl: Send + Sync {
    /// Queries the host application and writes the result into the store.
    async fn check_status(&self) -> Snapshot;
    async fn start(&self) -> Result<Snapshot, ControlError>;
    async fn start_from_beginning(&self) -> Result<Snapshot, ControlError>;
    async fn stop(&self) -> Result<Snapshot, ControlError>;
    /// Fails with [`ControlError::NotPlaying`] without navigating when no
    /// slideshow is running.
    async fn next(&self) -> Result<Snapshot, ControlError>;
    async fn previous(&self) -> Result<Snapshot, ControlError>;
    async fn go_to_slide(&self, slide: u32) -> Result<Snapshot, ControlError>;
    async fn open_presentation(&self, path: PathBuf) -> Result<Snapshot, ControlError>;
    async fn close_presentation(&self) -> Result<Snapshot, ControlError>;
}

/// Turns a backend status result into a snapshot update.
pub fn classify_status(result: Result<HostStatus, AutomationError>) -> SnapshotUpdate {
    match result {
        Ok(status) => SnapshotUpdate::observed(
            status.document,
            status.current_slide,
            status.total_slides,
            status.playing,
        ),
        Err(AutomationError::AdapterUnavailable) => SnapshotUpdate::reset(NOT_RUNNING_REASON),
        Err(AutomationError::NoDocument) => SnapshotUpdate::reset(NO_DOCUMENT_REASON),
        Err(AutomationError::Failure(reason)) => SnapshotUpdate::failure(reason),
    }
}

/// [`PresentationControl`] backed by an [`AutomationBackend`] and a
/// [`StateStore`].
pub struct KeynoteController {
    backend: Arc<dyn AutomationBackend>,
    store: Arc<StateStore>,
}

impl KeynoteController {
    pub fn new(backend: Arc<dyn AutomationBackend>, store: Arc<StateStore>) -> Self {
        Self { backend, store }
    }

    /// Queries the host and applies the outcome, with `action_error` (the
    /// failure of the action that preceded the query) attached as the
    /// snapshot error.
    async fn refresh_status(&self, action_error: Option<&AutomationError>) -> Snapshot {
        let ticket = self.store.begin_refresh();
        let result = self.backend.query_status().await;
        if let Err(AutomationError::Failure(reason)) = &result {
            warn!(seq = ticket.sequence(), %reason, "status query failed");
        }
        let mut update = classify_status(result);
        if let Some(e) = action_error {
            update = update.error(Some(failure_reason(e)));
        }

        match self.store.apply_refresh(ticket, update) {
            Some(snapshot) => snapshot,
            // Overtaken by a newer refresh; the action failure still has to show.
            None => match action_error {
                Some(e) => self
                    .store
                    .update_state(SnapshotUpdate::failure(failure_reason(e))),
                None => self.store.get_state(),
            },
        }
    }

    /// Refreshes after an action and reports the action's outcome.
    async fn settle(
        &self,
        action: &'static str,
        outcome: Result<(), AutomationError>,
    ) -> Result<Snapshot, ControlError> {
        match outcome {
            Ok(()) => Ok(self.refresh_status(None).await),
            Err(e) => {
                debug!(action, error = %e, "action failed; refreshing with error");
                self.refresh_status(Some(&e)).await;
                Err(e.into())
            }
        }
    }

    async fn navigate(&self, direction: Direction) -> Result<Snapshot, ControlError> {
        let current = self.check_status().await;
        if !current.playing {
            info!(?direction, "cannot navigate: no slideshow is playing");
            return Err(ControlError::NotPlaying);
        }
        match direction {
            Direction::Next => self.settle("next", self.backend.show_next().await).await,
            Direction::Previous => {
                self.settle("previous", self.backend.show_previous().await)
                    .await
            }
        }
    }
}

/// The text published in the snapshot's `error` field for `error`.
fn failure_reason(error: &AutomationError) -> String {
    match error {
        AutomationError::AdapterUnavailable => NOT_RUNNING_REASON.to_string(),
        AutomationError::NoDocument => NO_DOCUMENT_REASON.to_string(),
        AutomationError::Failure(reason) => reason.clone(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Next,
    Previous,
}

#[async_trait]
impl PresentationControl for KeynoteController {
    async fn check_status(&self) -> Snapshot {
        self.refresh_status(None).await
    }

    async fn start(&self) -> Result<Snapshot, ControlError> {
        self.settle("start", self.backend.start_slideshow().await)
            .await
    }

    async fn start_from_beginning(&self) -> Result<Snapshot, ControlError> {
        // A failed activation is reported in the snapshot but not to the caller.
        match self.backend.start_from_beginning().await {
            Ok(()) => Ok(self.refresh_status(None).await),
            Err(e) => {
                warn!(error = %e, "start from beginning failed");
                Ok(self.refresh_status(Some(&e)).await)
            }
        }
    }

    async fn stop(&self) -> Result<Snapshot, ControlError> {
        self.settle("stop", self.backend.stop_slideshow().await)
            .await
    }

    async fn next(&self) -> Result<Snapshot, ControlError> {
        self.navigate(Direction::Next).await
    }

    async fn previous(&self) -> Result<Snapshot, ControlError> {
        self.navigate(Direction::Previous).await
    }

    async fn go_to_slide(&self, slide: u32) -> Result<Snapshot, ControlError> {
        debug!(slide, "showing slide");
        self.settle("goto", self.backend.show_slide(slide).await)
            .await
    }

    async fn open_presentation(&self, path: PathBuf) -> Result<Snapshot, ControlError> {
        info!(path = %path.display(), "opening presentation");
        self.settle("open", self.backend.open(path).await).await
    }

    async fn close_presentation(&self) -> Result<Snapshot, ControlError> {
        self.settle("close", self.backend.close_front_document().await)
            .await
    }
}

#[async_trait]
impl StatusRefresher for KeynoteController {
    async fn refresh(&self) {
        self.check_status().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::automation::mock::{BackendCall, ScriptedBackend};
    use std::time::Duration;

    fn deck(slide: u32, playing: bool) -> HostStatus {
        HostStatus {
            document: "Deck.key".to_string(),
            current_slide: slide,
            total_slides: 12,
            playing,
        }
    }

    fn setup(backend: &Arc<ScriptedBackend>) -> (KeynoteController, Arc<StateStore>) {
        let store = Arc::new(StateStore::new(Duration::from_millis(300)));
        let controller = KeynoteController::new(backend.clone(), Arc::clone(&store));
        (controller, store)
    }

    // ── Classification ───────────────────────────────────────────────────────

    #[test]
    fn test_classify_not_running_resets_with_reason() {
        let update = classify_status(Err(AutomationError::AdapterUnavailable));
        assert_eq!(update, SnapshotUpdate::reset("Keynote not running"));
    }

    #[test]
    fn test_classify_no_document_resets_with_reason() {
        let update = classify_status(Err(AutomationError::NoDocument));
        assert_eq!(update, SnapshotUpdate::reset("No document open"));
    }

    #[test]
    fn test_classify_generic_failure_sets_error_only() {
        let update = classify_status(Err(AutomationError::Failure("exit 1".into())));
        assert_eq!(update, SnapshotUpdate::failure("exit 1"));
    }

    // ── check_status ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_check_status_observes_host() {
        // Arrange
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(3, false)));
        let (controller, store) = setup(&backend);

        // Act
        let snap = controller.check_status().await;

        // Assert
        assert_eq!(snap.document.as_deref(), Some("Deck.key"));
        assert_eq!(snap.current_slide, 3);
        assert_eq!(snap.total_slides, 12);
        assert_eq!(store.get_state(), snap);
    }

    #[tokio::test]
    async fn test_generic_failure_preserves_last_known_fields() {
        // Arrange
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(4, true)));
        backend.push_status(Err(AutomationError::Failure("osascript timed out".into())));
        let (controller, _store) = setup(&backend);
        controller.check_status().await;

        // Act
        let snap = controller.check_status().await;

        // Assert
        assert_eq!(snap.document.as_deref(), Some("Deck.key"));
        assert_eq!(snap.current_slide, 4);
        assert_eq!(snap.total_slides, 12);
        assert_eq!(snap.error.as_deref(), Some("osascript timed out"));
    }

    #[tokio::test]
    async fn test_not_running_resets_snapshot() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(4, true)));
        backend.push_status(Err(AutomationError::AdapterUnavailable));
        let (controller, store) = setup(&backend);
        controller.check_status().await;

        let snap = controller.check_status().await;

        assert_eq!(snap.document, None);
        assert_eq!(snap.current_slide, 0);
        assert!(!snap.playing);
        assert!(!store.is_polling(), "falling edge stops polling");
        assert_eq!(snap.error.as_deref(), Some("Keynote not running"));
    }

    // ── Actions ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_next_while_not_playing_issues_no_navigation() {
        // Arrange
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(2, false)));
        let (controller, _store) = setup(&backend);

        // Act
        let result = controller.next().await;

        // Assert
        assert_eq!(result, Err(ControlError::NotPlaying));
        assert_eq!(backend.calls(), vec![BackendCall::QueryStatus]);
    }

    #[tokio::test]
    async fn test_previous_while_playing_navigates_then_refreshes() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(5, true)));
        backend.push_status(Ok(deck(4, true)));
        let (controller, _store) = setup(&backend);

        let snap = controller.previous().await.unwrap();

        assert_eq!(snap.current_slide, 4);
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::QueryStatus,
                BackendCall::ShowPrevious,
                BackendCall::QueryStatus
            ]
        );
    }

    #[tokio::test]
    async fn test_go_to_slide_issues_show_slide() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(4, true)));
        let (controller, _store) = setup(&backend);

        let snap = controller.go_to_slide(4).await.unwrap();

        assert_eq!(snap.current_slide, 4);
        assert_eq!(
            backend.calls(),
            vec![BackendCall::ShowSlide(4), BackendCall::QueryStatus]
        );
    }

    #[tokio::test]
    async fn test_failed_action_refreshes_and_sets_error() {
        // Arrange
        let backend = Arc::new(ScriptedBackend::with_deck("Deck.key", 10));
        backend.fail_actions(AutomationError::Failure("stop refused".into()));
        let (controller, store) = setup(&backend);

        // Act
        let result = controller.stop().await;

        // Assert
        assert_eq!(
            result,
            Err(ControlError::Automation(AutomationError::Failure(
                "stop refused".into()
            )))
        );
        let state = store.get_state();
        assert_eq!(state.error.as_deref(), Some("stop refused"));
        assert_eq!(state.document.as_deref(), Some("Deck.key"), "last known fields kept");
        assert_eq!(state.total_slides, 10);
        assert_eq!(
            backend.calls(),
            vec![BackendCall::StopSlideshow, BackendCall::QueryStatus]
        );
    }

    #[tokio::test]
    async fn test_failed_goto_reports_error_in_store() {
        let backend = Arc::new(ScriptedBackend::with_deck("Deck.key", 10));
        backend.fail_actions(AutomationError::Failure("slide 3 unavailable".into()));
        let (controller, store) = setup(&backend);

        assert!(controller.go_to_slide(3).await.is_err());

        assert_eq!(store.get_state().error.as_deref(), Some("slide 3 unavailable"));
        assert_eq!(
            backend.calls(),
            vec![BackendCall::ShowSlide(3), BackendCall::QueryStatus]
        );
    }

    #[tokio::test]
    async fn test_failed_navigation_reports_error_in_store() {
        // Arrange: playing, so navigation is attempted
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(2, true)));
        backend.push_status(Ok(deck(2, true)));
        backend.fail_actions(AutomationError::Failure("next refused".into()));
        let (controller, store) = setup(&backend);

        // Act
        let result = controller.next().await;

        // Assert
        assert!(matches!(result, Err(ControlError::Automation(_))));
        let state = store.get_state();
        assert_eq!(state.error.as_deref(), Some("next refused"));
        assert_eq!(state.current_slide, 2);
        store.stop_polling();
    }

    #[tokio::test]
    async fn test_successful_action_clears_previous_action_error() {
        let backend = Arc::new(ScriptedBackend::with_deck("Deck.key", 10));
        backend.fail_actions(AutomationError::Failure("busy".into()));
        let (controller, store) = setup(&backend);
        let _ = controller.go_to_slide(4).await;
        let backend_ok = Arc::new(ScriptedBackend::with_deck("Deck.key", 10));
        let controller = KeynoteController::new(backend_ok.clone(), Arc::clone(&store));

        controller.go_to_slide(4).await.unwrap();

        assert_eq!(store.get_state().error, None);
        assert_eq!(backend_ok.deck().map(|d| d.current_slide), Some(4));
    }

    #[tokio::test]
    async fn test_start_from_beginning_refreshes_even_when_action_fails() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_actions(AutomationError::Failure("no front document".into()));
        backend.push_status(Err(AutomationError::NoDocument));
        let (controller, _store) = setup(&backend);

        let snap = controller.start_from_beginning().await.unwrap();

        assert_eq!(snap.document, None, "no-document reset still applies");
        assert_eq!(snap.error.as_deref(), Some("no front document"));
        assert_eq!(
            backend.calls(),
            vec![BackendCall::StartFromBeginning, BackendCall::QueryStatus]
        );
    }

    #[tokio::test]
    async fn test_open_passes_path_to_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(1, false)));
        let (controller, _store) = setup(&backend);

        controller
            .open_presentation(PathBuf::from("/tmp/a.key"))
            .await
            .unwrap();

        assert_eq!(backend.calls()[0], BackendCall::Open(PathBuf::from("/tmp/a.key")));
    }

    #[tokio::test]
    async fn test_refresher_writes_into_store() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(9, false)));
        let (controller, store) = setup(&backend);

        controller.refresh().await;

        assert_eq!(store.get_state().current_slide, 9);
    }

    // ── Refresh races ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_overtaken_by_command_refresh_is_discarded() {
        // Arrange: the tick's query takes 200ms, the command's only 50ms.
        // Results are handed out in completion order: 7 to the command, 3 to the tick.
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(7, false)));
        backend.push_status(Ok(deck(3, false)));
        let (controller, store) = setup(&backend);
        let controller = Arc::new(controller);

        backend.set_query_delay(Duration::from_millis(200));
        let tick = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.check_status().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        backend.set_query_delay(Duration::from_millis(50));

        // Act
        let command = controller.go_to_slide(7).await.unwrap();
        let tick = tick.await.unwrap();

        // Assert
        assert_eq!(command.current_slide, 7);
        assert_eq!(tick.current_slide, 7, "the older refresh sees the newer state");
        assert_eq!(store.get_state().current_slide, 7);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_started_in_order_let_the_last_one_win() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(5, false)));
        backend.push_status(Ok(deck(8, false)));
        let (controller, store) = setup(&backend);
        let controller = Arc::new(controller);

        backend.set_query_delay(Duration::from_millis(50));
        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.check_status().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        backend.set_query_delay(Duration::from_millis(200));
        let second = controller.check_status().await;

        assert_eq!(first.await.unwrap().current_slide, 5);
        assert_eq!(second.current_slide, 8);
        assert_eq!(store.get_state().current_slide, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_poll_refresh_applies_after_stop() {
        // Arrange
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(deck(6, false)));
        backend.set_query_delay(Duration::from_millis(50));
        let (controller, store) = setup(&backend);
        let refresher: Arc<dyn StatusRefresher> = Arc::new(controller);
        store.start_polling(Duration::from_millis(100), &refresher);

        // Act: the first tick fires at 100ms and its query runs until 150ms
        tokio::time::sleep(Duration::from_millis(120)).await;
        store.stop_polling();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert!(!store.is_polling());
        assert_eq!(store.get_state().current_slide, 6);
        assert_eq!(backend.calls(), vec![BackendCall::QueryStatus]);
    }
}
