//! CommandRouter: maps inbound OSC messages to presentation actions.
//!
//! Routing never fails from the caller's point of view.  Each message is
//! parsed into a [`Command`]; unknown addresses are logged and skipped,
//! malformed arguments drop that one command, and every action or adapter
//! failure is caught and logged here.  A panic inside an action future is
//! caught as well, so the receive loop that feeds the router keeps running
//! whatever a single message does.
//!
//! State-changing actions refresh the status themselves (see
//! [`PresentationControl`]); the refresh notifies the store, and the store
//! notifies the publisher.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::FutureExt;
use keyosc_core::{Command, ConfigUpdate, OscMessage, PresentationEntry, Snapshot};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::application::control_presentation::{ControlError, PresentationControl};
use crate::application::publish_status::StatusPublisher;

/// Source of presentation files for `/list`.
#[async_trait]
pub trait PresentationCatalog: Send + Sync {
    /// The configured content directory, if any.
    fn root(&self) -> Option<PathBuf>;

    fn set_root(&self, root: PathBuf);

    /// Lists presentations in `dir`, or in [`root`](Self::root) when `dir`
    /// is `None`.  Never fails; problems yield an empty list.
    async fn list(&self, dir: Option<PathBuf>) -> Vec<PresentationEntry>;
}

pub struct CommandRouter {
    control: Arc<dyn PresentationControl>,
    catalog: Arc<dyn PresentationCatalog>,
    publisher: Arc<StatusPublisher>,
    namespace: RwLock<String>,
    config_updates: Option<UnboundedSender<ConfigUpdate>>,
}

impl CommandRouter {
    pub fn new(
        control: Arc<dyn PresentationControl>,
        catalog: Arc<dyn PresentationCatalog>,
        publisher: Arc<StatusPublisher>,
        namespace: &str,
    ) -> Self {
        Self {
            control,
            catalog,
            publisher,
            namespace: RwLock::new(namespace.to_string()),
            config_updates: None,
        }
    }

    /// Forwards `/set-path` as a [`ConfigUpdate`] on `tx`.
    pub fn with_config_updates(mut self, tx: UnboundedSender<ConfigUpdate>) -> Self {
        self.config_updates = Some(tx);
        self
    }

    pub fn set_namespace(&self, namespace: &str) {
        *self.namespace.write().unwrap_or_else(PoisonError::into_inner) = namespace.to_string();
    }

    fn namespace(&self) -> String {
        self.namespace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Parses and executes one message.
    pub async fn route(&self, message: OscMessage) {
        debug!(address = %message.address, args = message.args.len(), "received OSC message");

        let command = match Command::parse(&self.namespace(), &message) {
            Ok(command) => command,
            Err(e) => {
                warn!(address = %message.address, error = %e, "dropping malformed command");
                return;
            }
        };

        let name = command.name();
        if AssertUnwindSafe(self.dispatch(command))
            .catch_unwind()
            .await
            .is_err()
        {
            warn!(command = name, "command handler panicked");
        }
    }

    async fn dispatch(&self, command: Command) {
        let name = command.name();
        let result = match command {
            Command::Start => self.control.start().await,
            Command::StartFromBeginning => self.control.start_from_beginning().await,
            Command::Stop => self.control.stop().await,
            Command::Next => self.control.next().await,
            Command::Previous => self.control.previous().await,
            Command::GoTo(slide) => self.control.go_to_slide(slide).await,
            Command::Open(path) | Command::OpenBase64(path) => {
                self.control.open_presentation(path).await
            }
            Command::Close => self.control.close_presentation().await,
            Command::Status => Ok(self.control.check_status().await),
            Command::List(dir) => {
                let entries = self.catalog.list(dir).await;
                info!(count = entries.len(), "listing presentations");
                self.publisher.publish_presentations(&entries);
                return;
            }
            Command::SetPath(path) => {
                self.set_content_path(path);
                return;
            }
            Command::Unknown(address) => {
                debug!(%address, "ignoring unknown address");
                return;
            }
        };
        log_outcome(name, result);
    }

    fn set_content_path(&self, path: PathBuf) {
        info!(path = %path.display(), "content path updated");
        self.catalog.set_root(path.clone());
        if let Some(tx) = &self.config_updates {
            if tx.send(ConfigUpdate::content_path(path)).is_err() {
                warn!("config update channel closed; content path not persisted");
            }
        }
    }
}

fn log_outcome(command: &'static str, result: Result<Snapshot, ControlError>) {
    match result {
        Ok(snapshot) => debug!(
            command,
            slide = snapshot.current_slide,
            playing = snapshot.playing,
            "command executed"
        ),
        Err(ControlError::NotPlaying) => info!(command, "ignored: no slideshow is playing"),
        Err(e) => warn!(command, error = %e, "command failed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
