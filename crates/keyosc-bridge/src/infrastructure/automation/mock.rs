//! Scripted automation backend for tests.
//!
//! [`ScriptedBackend`] records every call and answers status queries either
//! from a queue of canned results or from a small simulated deck that the
//! actions mutate, so tests can run without macOS or Keynote.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::control_presentation::{AutomationBackend, AutomationError, HostStatus};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    QueryStatus,
    StartSlideshow,
    StartFromBeginning,
    StopSlideshow,
    ShowNext,
    ShowPrevious,
    ShowSlide(u32),
    Open(PathBuf),
    CloseFrontDocument,
}

#[derive(Default)]
struct Script {
    calls: Vec<BackendCall>,
    statuses: VecDeque<Result<HostStatus, AutomationError>>,
    last: Option<Result<HostStatus, AutomationError>>,
    deck: Option<HostStatus>,
    action_error: Option<AutomationError>,
    query_delay: Duration,
}

/// An [`AutomationBackend`] driven entirely by the test.
///
/// Status queries return, in order of preference: the next queued result,
/// the simulated deck, the last result returned, or
/// [`AutomationError::NoDocument`].
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend simulating an open, stopped deck on slide 1.
    pub fn with_deck(document: &str, total_slides: u32) -> Self {
        let backend = Self::new();
        backend.lock().deck = Some(HostStatus {
            document: document.to_string(),
            current_slide: 1,
            total_slides,
            playing: false,
        });
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a result for the next status query.
    pub fn push_status(&self, result: Result<HostStatus, AutomationError>) {
        self.lock().statuses.push_back(result);
    }

    /// Makes every action fail with `error`.
    pub fn fail_actions(&self, error: AutomationError) {
        self.lock().action_error = Some(error);
    }

    /// Delays every status query by `delay`.
    pub fn set_query_delay(&self, delay: Duration) {
        self.lock().query_delay = delay;
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Calls other than status queries.
    pub fn actions(&self) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| **c != BackendCall::QueryStatus)
            .cloned()
            .collect()
    }

    /// The simulated deck, if any.
    pub fn deck(&self) -> Option<HostStatus> {
        self.lock().deck.clone()
    }

    fn act(
        &self,
        call: BackendCall,
        apply: impl FnOnce(&mut HostStatus),
    ) -> Result<(), AutomationError> {
        let mut script = self.lock();
        script.calls.push(call);
        if let Some(err) = &script.action_error {
            return Err(err.clone());
        }
        if let Some(deck) = script.deck.as_mut() {
            apply(deck);
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationBackend for ScriptedBackend {
    async fn query_status(&self) -> Result<HostStatus, AutomationError> {
        let delay = {
            let mut script = self.lock();
            script.calls.push(BackendCall::QueryStatus);
            script.query_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.lock();
        let result = match script.statuses.pop_front() {
            Some(queued) => queued,
            None => match (&script.deck, &script.last) {
                (Some(deck), _) => Ok(deck.clone()),
                (None, Some(last)) => last.clone(),
                (None, None) => Err(AutomationError::NoDocument),
            },
        };
        script.last = Some(result.clone());
        result
    }

    async fn start_slideshow(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::StartSlideshow, |d| d.playing = true)
    }

    async fn start_from_beginning(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::StartFromBeginning, |d| {
            d.playing = true;
            d.current_slide = 1;
        })
    }

    async fn stop_slideshow(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::StopSlideshow, |d| d.playing = false)
    }

    async fn show_next(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::ShowNext, |d| {
            d.current_slide = (d.current_slide + 1).min(d.total_slides)
        })
    }

    async fn show_previous(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::ShowPrevious, |d| {
            d.current_slide = d.current_slide.saturating_sub(1).max(1)
        })
    }

    async fn show_slide(&self, slide: u32) -> Result<(), AutomationError> {
        self.act(BackendCall::ShowSlide(slide), |d| {
            d.current_slide = slide.min(d.total_slides)
        })
    }

    async fn open(&self, path: PathBuf) -> Result<(), AutomationError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.act(BackendCall::Open(path), |d| {
            d.document = name;
            d.current_slide = 1;
            d.playing = false;
        })
    }

    async fn close_front_document(&self) -> Result<(), AutomationError> {
        self.act(BackendCall::CloseFrontDocument, |_| {})?;
        let mut script = self.lock();
        script.deck = None;
        script.last = Some(Err(AutomationError::NoDocument));
        Ok(())
    }
}
