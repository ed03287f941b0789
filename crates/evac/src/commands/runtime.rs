//! Connected-command runtime: one orchestrator over file-backed services.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use evac_api::stream::Boxed;
use evac_core::{ConnectionState, FileStorage, Orchestrator, Services, SharedStorage};

use crate::config::Session;
use crate::error::CliError;

/// Services backed by the snapshot cache under `cache_dir`.
pub fn cached_services(cache_dir: &Path, session: Option<&Session>) -> (Services, SharedStorage) {
    let storage: SharedStorage = Arc::new(FileStorage::new(cache_dir));
    let mut builder = Services::builder().storage(Arc::clone(&storage));
    if let Some(session) = session {
        builder = builder.options(session.options);
    }
    (builder.build(), storage)
}

pub struct Runtime {
    pub services: Services,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl Runtime {
    /// Spawn the orchestrator; services start once the socket opens.
    pub fn start(session: &Session, timeout: Duration) -> Self {
        let (services, storage) = cached_services(&session.cache_dir, Some(session));
        let orchestrator = Arc::new(Orchestrator::new(
            session.orchestrator.clone(),
            services.managed(),
            Some(storage),
        ));
        let cancel = CancellationToken::new();
        debug!(profile = %session.profile_name, url = %session.orchestrator.url, "starting orchestrator");

        let task = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            let cancel = cancel.clone();
            async move { orchestrator.run(cancel).await }
        });

        Self {
            services,
            orchestrator,
            cancel,
            task,
            timeout,
        }
    }

    pub fn states(&self) -> WatchStream<ConnectionState> {
        self.orchestrator.state_stream()
    }

    /// Run `op` under the command deadline. A deadline hit before the
    /// socket ever opened is reported as a connection failure.
    pub async fn within<T, F>(&self, op: F) -> Result<T, CliError>
    where
        F: Future<Output = Result<T, CliError>>,
    {
        if let Ok(result) = tokio::time::timeout(self.timeout, op).await {
            return result;
        }
        let state = *self.orchestrator.connection_state().borrow();
        if state == ConnectionState::Connected {
            Err(CliError::timeout(self.timeout))
        } else {
            Err(CliError::ConnectionFailed {
                url: self.orchestrator.config().url.to_string(),
                reason: format!(
                    "still {state} after {}",
                    humantime::format_duration(self.timeout)
                ),
            })
        }
    }

    /// Cancel the orchestrator and wait for every service to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Wait until a replacement satisfies `done`.
pub async fn await_echo<T>(
    mut updates: Boxed<Arc<T>>,
    done: impl Fn(&T) -> bool,
) -> Result<(), CliError> {
    while let Some(value) = updates.next().await {
        if done(&value) {
            return Ok(());
        }
    }
    Err(CliError::OperationFailed {
        message: "update stream ended before the server confirmed".into(),
    })
}
