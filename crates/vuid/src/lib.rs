//! vuid - voice-skill lifecycle supervisor daemon
//!
//! Library components for the daemon process: package loading, the
//! lifecycle stack and router, the procedure-call facade, and the actor
//! that serializes all of them.

pub mod actor;
pub mod app;
pub mod facade;
pub mod notify;
pub mod permission;
pub mod registry;
pub mod router;
pub mod speech;
pub mod stack;
pub mod supervisor;
pub mod testing;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vui_core::{Config, ConfigError};

pub use actor::{HandleError, SupervisorHandle};
pub use facade::{FacadeError, Outcome};
pub use supervisor::{Supervisor, SupervisorError};

use app::ForwardingLauncher;
use notify::Notifier;
use permission::PermissionGate;
use registry::{ExecutorRegistry, LoadError};
use speech::SilentSynthesizer;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("app loading failed: {0}")]
    Load(#[from] LoadError),
    #[error("supervisor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    pub supervisor: Config,
    /// Read newline-delimited `{"nlp": .., "action": ..}` commands from stdin.
    pub stdin_commands: bool,
}

/// Daemon state.
#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    handle: SupervisorHandle,
    notifier: Notifier,
    cancel: CancellationToken,
    task: JoinHandle<Supervisor>,
}

impl Daemon {
    /// Load every package and start the supervisor task.
    ///
    /// Requests are only accepted once loading has finished.
    pub async fn new(config: DaemonConfig) -> Result<Self, DaemonError> {
        config.supervisor.validate()?;
        for warning in &config.supervisor.warnings {
            warn!("{warning}");
        }

        let mut registry = ExecutorRegistry::new();
        let mut permissions = PermissionGate::new();
        let report = registry
            .load_all(&config.supervisor.app_dirs, &mut permissions)
            .await?;
        for skipped in &report.skipped {
            warn!(path = %skipped.path.display(), reason = ?skipped.reason, "package skipped");
        }

        let notifier = Notifier::new(config.supervisor.notification_capacity);
        let supervisor = Supervisor::new(
            registry,
            permissions,
            Arc::new(ForwardingLauncher::new(notifier.clone())),
            Arc::new(SilentSynthesizer),
            notifier.clone(),
            &config.supervisor,
        );

        let cancel = CancellationToken::new();
        let (handle, task) =
            actor::spawn(supervisor, config.supervisor.request_queue, cancel.clone());

        Ok(Self {
            config,
            handle,
            notifier,
            cancel,
            task,
        })
    }

    /// Request/response channel for transports.
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run until shutdown is requested.
    pub async fn run(&self) {
        info!(
            app_dirs = ?self.config.supervisor.app_dirs,
            strict_foreground = self.config.supervisor.strict_foreground,
            "vuid running"
        );

        let logger = tokio::spawn(log_notifications(
            self.notifier.subscribe(),
            self.cancel.clone(),
        ));
        let stdin = self
            .config
            .stdin_commands
            .then(|| tokio::spawn(read_stdin_commands(self.handle(), self.cancel.clone())));

        self.cancel.cancelled().await;

        if let Some(stdin) = stdin {
            stdin.abort();
        }
        logger.abort();
    }

    /// Signal the daemon to shut down.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.cancel.cancel();
    }

    /// Wait for the supervisor task to tear down every running app.
    pub async fn join(self) -> Result<(), DaemonError> {
        self.cancel.cancel();
        let supervisor = self.task.await?;
        debug!(skills = supervisor.registry().len(), "supervisor joined");
        Ok(())
    }
}

async fn log_notifications(
    mut rx: broadcast::Receiver<vui_core::NotificationEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(envelope) => {
                let payload = envelope.payload.to_json().unwrap_or_default();
                info!(
                    notification = envelope.notification_type.as_str(),
                    emitted_at = %envelope.emitted_at.to_rfc3339(),
                    payload = %payload,
                    "notification"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StdinCommand {
    nlp: Value,
    action: Value,
}

async fn read_stdin_commands(handle: SupervisorHandle, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading voice commands from stdin");

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command: StdinCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "invalid stdin command");
                continue;
            }
        };
        match handle.nlp(command.nlp, command.action).await {
            Ok(()) => {}
            Err(HandleError::Closed) => break,
            Err(e) => warn!(error = %e, "stdin command rejected"),
        }
    }
}
