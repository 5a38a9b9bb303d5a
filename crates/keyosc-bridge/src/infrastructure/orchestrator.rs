//! Bridge lifecycle: owns the inbound listener and the outbound link.
//!
//! The [`Bridge`] holds the configuration in effect as an immutable value.
//! `start` binds the listener and builds the sender from that value;
//! `update_config` replaces it wholesale and, when running, performs a full
//! stop/start cycle.  If the new configuration cannot be brought up, the
//! previous one is restored and restarted so the bridge never runs a mix of
//! old and new settings.

use std::net::SocketAddr;
use std::sync::Arc;

use keyosc_core::{BridgeConfig, ConfigUpdate};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::publish_status::StatusPublisher;
use crate::application::route_command::{CommandRouter, PresentationCatalog};
use crate::application::state_store::StateStore;
use crate::infrastructure::network::{ListenError, OscListener, UdpOscSender};

/// Error type for bridge lifecycle operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The inbound endpoint could not be bound.  Fatal at startup.
    #[error(transparent)]
    Listen(#[from] ListenError),
}

pub struct Bridge {
    config: BridgeConfig,
    router: Arc<CommandRouter>,
    publisher: Arc<StatusPublisher>,
    store: Arc<StateStore>,
    catalog: Arc<dyn PresentationCatalog>,
    listener: Option<OscListener>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        router: Arc<CommandRouter>,
        publisher: Arc<StatusPublisher>,
        store: Arc<StateStore>,
        catalog: Arc<dyn PresentationCatalog>,
    ) -> Self {
        Self {
            config,
            router,
            publisher,
            store,
            catalog,
            listener: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether the inbound listener is bound.
    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Address the listener is bound to, if running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(OscListener::local_addr)
    }

    /// Binds the listener and connects the outbound link.
    ///
    /// The outbound link is best effort: a remote that does not resolve is
    /// logged and the publisher stays disconnected until the next update.
    /// Calling `start` on a running bridge does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Listen`] if the listener cannot be bound.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if self.is_running() {
            return Ok(());
        }

        self.apply_settings();
        let listener =
            OscListener::bind(&self.config.listen_addr(), Arc::clone(&self.router)).await?;

        let remote = self.config.remote_addr();
        match UdpOscSender::connect(&remote).await {
            Ok(sender) => {
                info!(remote = %sender.remote_addr(), "publishing status");
                self.publisher.connect(Arc::new(sender));
                self.publisher.publish_snapshot(&self.store.get_state());
            }
            Err(e) => {
                warn!(%remote, error = %e, "outbound link unavailable; status will not be published");
                self.publisher.disconnect();
            }
        }

        info!(local_addr = %listener.local_addr(), "bridge started");
        self.listener = Some(listener);
        Ok(())
    }

    /// Releases the listener and closes the outbound link.  Idempotent.
    pub async fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
            info!("bridge stopped");
        }
        self.publisher.disconnect();
    }

    /// Adopts `update` merged into the current configuration.
    ///
    /// A running bridge is restarted so the new endpoints take effect.  On
    /// failure the previous configuration is restored and restarted, and the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Listen`] if the new listener cannot be bound.
    pub async fn update_config(&mut self, update: &ConfigUpdate) -> Result<(), BridgeError> {
        let previous = self.config.clone();
        let next = update.apply(&previous);
        if next == previous {
            return Ok(());
        }

        if !self.is_running() {
            self.config = next;
            self.apply_settings();
            return Ok(());
        }

        self.stop().await;
        self.config = next;
        if let Err(e) = self.start().await {
            warn!(error = %e, "configuration update failed; restoring previous configuration");
            self.config = previous;
            if let Err(restore) = self.start().await {
                error!(error = %restore, "failed to restart with previous configuration");
            }
            return Err(e);
        }

        info!(
            local_addr = ?self.local_addr(),
            remote = %self.config.remote_addr(),
            "configuration applied"
        );
        Ok(())
    }

    /// Pushes the settings that do not need a socket into the components.
    fn apply_settings(&self) {
        let namespace = self.config.namespace_prefix();
        self.router.set_namespace(namespace);
        self.publisher.set_namespace(namespace);
        self.store.set_poll_interval(self.config.polling_interval());
        if let Some(root) = &self.config.content_path {
            if self.catalog.root().as_ref() != Some(root) {
                self.catalog.set_root(root.clone());
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
