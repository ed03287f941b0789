// ── Orchestrator ──
//
// Binds one transport connection to every service and restarts the whole
// pipeline whenever that connection ends. Services are always re-wired to
// a fresh `Connection`; no socket identity survives a drop.

use std::fmt;
use std::sync::Arc;

use evac_api::stream::merge_signals;
use evac_api::{Connection, ConnectionOptions, FrameStream};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::service::{ManagedService, RunningService, StartOptions};
use crate::storage::SharedStorage;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Supervisor for the connection ⇄ services lifecycle.
pub struct Orchestrator {
    config: OrchestratorConfig,
    services: Vec<Arc<dyn ManagedService>>,
    storage: Option<SharedStorage>,
    state: watch::Sender<ConnectionState>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        services: Vec<Arc<dyn ManagedService>>,
        storage: Option<SharedStorage>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            services,
            storage,
            state,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current state followed by every change.
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Connect, run every service, and start over whenever the connection
    /// ends or anything in the attempt fails.
    ///
    /// Returns only once `cancel` fires; cancelling it stops every service
    /// and disposes the socket.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.state.send_replace(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            let mut running = Vec::with_capacity(self.services.len());
            let result = self.attempt(&cancel, &mut running).await;

            for service in running.drain(..) {
                service.stop();
            }
            let was_connected = *self.state.borrow() == ConnectionState::Connected;
            self.state.send_replace(ConnectionState::Disconnected);

            if cancel.is_cancelled() {
                break;
            }
            match result {
                Ok(()) => info!(url = %self.config.url, "connection ended, restarting services"),
                Err(e) => error!(url = %self.config.url, attempt, error = %e, "orchestration attempt failed"),
            }
            attempt = if was_connected { 1 } else { attempt.saturating_add(1) };

            debug!(delay = ?self.config.restart_delay, "waiting before next attempt");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.restart_delay) => {}
            }
        }
        info!("orchestrator stopped");
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        running: &mut Vec<RunningService>,
    ) -> Result<(), CoreError> {
        let options = ConnectionOptions {
            reconnect: true,
            retry: self.config.retry,
            handshake: self.config.credentials.as_ref().map(|c| c.login_frame()),
            ..ConnectionOptions::default()
        };
        let connection = Connection::connect(self.config.url.clone(), options, Some(cancel));
        let _guard = connection.dispose_guard();

        // Subscribe before the socket opens so no early frame is lost.
        let frames: Vec<FrameStream> = self
            .services
            .iter()
            .map(|service| service.frames(&connection))
            .collect();
        let mut liveness = connection.messages();

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            opened = connection.opened() => opened,
        };
        opened.map_err(|e| CoreError::ConnectionFailed {
            url: self.config.url.to_string(),
            reason: e.to_string(),
        })?;

        self.state.send_replace(ConnectionState::Connected);
        info!(url = %self.config.url, services = self.services.len(), "connected, starting services");

        let signal = merge_signals([cancel.clone(), connection.signal().clone()]);
        for (service, frames) in self.services.iter().zip(frames) {
            running.push(service.start(StartOptions {
                connection: connection.clone(),
                frames: Some(frames),
                storage: self.storage.clone(),
                signal: Some(signal.clone()),
            }));
        }

        // Drained only to notice the end of the connection.
        while let Some(frame) = liveness.next().await {
            frame?;
        }
        Ok(())
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("url", &self.config.url.as_str())
            .field(
                "services",
                &self.services.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Run `services` against `config` until `cancel` fires.
pub async fn orchestrate(
    config: OrchestratorConfig,
    services: Vec<Arc<dyn ManagedService>>,
    storage: Option<SharedStorage>,
    cancel: CancellationToken,
) {
    Orchestrator::new(config, services, storage).run(cancel).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_renders_for_humans() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }
}
