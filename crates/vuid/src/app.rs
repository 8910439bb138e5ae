//! Running application instances and the launcher seam.
//!
//! A running instance is a typed event channel. What sits on the other end
//! (an in-process skill, a bridge to an out-of-process app) is the
//! launcher's business; the supervisor only ever sends events.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use vui_core::events::AppLifecyclePayload;
use vui_core::{AppId, LifecycleEvent, Notification};

use crate::notify::Notifier;
use crate::registry::AppExecutor;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executor for {0} is invalid: {1}")]
    InvalidExecutor(AppId, String),
    #[error("launch failed for {0}: {1}")]
    Failed(AppId, String),
}

/// A live instance bound to one stack identifier.
///
/// Form and cloud origin live in the stack's command context, which every
/// request replaces.
#[derive(Debug)]
pub struct RunningApp {
    pub app_id: AppId,
    events: mpsc::UnboundedSender<LifecycleEvent>,
}

impl RunningApp {
    pub fn new(app_id: AppId, events: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { app_id, events }
    }

    /// Send a lifecycle event without waiting for it to be handled.
    ///
    /// Returns false when the instance is no longer listening.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        let name = event.as_str();
        match self.events.send(event) {
            Ok(()) => {
                trace!(app_id = %self.app_id, event = name, "lifecycle event sent");
                true
            }
            Err(_) => {
                debug!(app_id = %self.app_id, event = name, "instance gone, event dropped");
                false
            }
        }
    }
}

/// Starts the behavior behind a running instance.
///
/// `launch` must not block: the instance consumes `events` on its own task.
pub trait AppLauncher: Send + Sync + std::fmt::Debug {
    fn launch(
        &self,
        app_id: &AppId,
        executor: &AppExecutor,
        events: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) -> Result<(), LaunchError>;
}

/// Default launcher.
///
/// External applications get their lifecycle events forwarded as
/// `appLifecycle` notifications addressed to their connection descriptor.
/// Local packages are hosted elsewhere, so their events are only logged.
#[derive(Debug, Clone)]
pub struct ForwardingLauncher {
    notifier: Notifier,
}

impl ForwardingLauncher {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl AppLauncher for ForwardingLauncher {
    fn launch(
        &self,
        app_id: &AppId,
        executor: &AppExecutor,
        mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) -> Result<(), LaunchError> {
        if let Some(errmsg) = &executor.errmsg {
            return Err(LaunchError::InvalidExecutor(app_id.clone(), errmsg.clone()));
        }

        let app_id = app_id.clone();
        let connection = executor.connection().cloned();
        let notifier = self.notifier.clone();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LaunchError::Failed(app_id.clone(), e.to_string()))?;

        runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let last = matches!(event, LifecycleEvent::Destroy);
                match &connection {
                    Some(connection) => {
                        notifier.publish(Notification::AppLifecycle(AppLifecyclePayload {
                            app_id: app_id.clone(),
                            connection: connection.clone(),
                            event,
                        }));
                    }
                    None => debug!(app_id = %app_id, event = event.as_str(), "app lifecycle"),
                }
                if last {
                    break;
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use vui_core::ConnectionDescriptor;

    #[test]
    fn emit_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = RunningApp::new(AppId::from("a"), tx);
        assert!(app.emit(LifecycleEvent::Pause));
        drop(rx);
        assert!(!app.emit(LifecycleEvent::Resume));
    }

    #[tokio::test]
    async fn forwards_external_events_until_destroy() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        let launcher = ForwardingLauncher::new(notifier);
        let id = AppId::from("remote");
        let executor =
            AppExecutor::external(id.clone(), ConnectionDescriptor::new("/remote", "com.example"));

        let (tx, events) = mpsc::unbounded_channel();
        launcher.launch(&id, &executor, events).unwrap();
        tx.send(LifecycleEvent::Create {
            nlp: Value::Null,
            action: Value::Null,
        })
        .unwrap();
        tx.send(LifecycleEvent::Destroy).unwrap();

        for expected in ["create", "destroy"] {
            let envelope = rx.recv().await.unwrap();
            let Notification::AppLifecycle(payload) = envelope.payload else {
                panic!("expected lifecycle notification");
            };
            assert_eq!(payload.app_id, "remote");
            assert_eq!(payload.connection.object_path, "/remote");
            assert_eq!(payload.event.as_str(), expected);
        }
    }

    #[test]
    fn rejects_invalid_executor() {
        let launcher = ForwardingLauncher::new(Notifier::new(4));
        let id = AppId::from("broken");
        let mut executor =
            AppExecutor::external(id.clone(), ConnectionDescriptor::new("/b", "com.example"));
        executor.valid = false;
        executor.errmsg = Some("entry not found".to_string());

        let (_tx, events) = mpsc::unbounded_channel();
        assert!(matches!(
            launcher.launch(&id, &executor, events),
            Err(LaunchError::InvalidExecutor(..))
        ));
    }
}
