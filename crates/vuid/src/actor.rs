//! Request loop that owns the supervisor.
//!
//! Voice input, cloud messages, and procedure calls all arrive as
//! [`SupervisorCommand`]s on one bounded queue and are applied strictly in
//! arrival order by a single task, so no two stack mutations interleave.
//!
//! ```text
//! voice pipeline ──┐
//!                  │
//! cloud channel ───┼──► mpsc::Sender<SupervisorCommand> ──► actor task
//!                  │                                           │
//! IPC transport ───┘                                           ▼
//!                                                   Supervisor (sequential)
//! ```

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vui_core::{AppId, ConnectionDescriptor, Id, SpeechEvent};

use crate::facade::{FacadeError, Outcome};
use crate::stack::StackSnapshot;
use crate::supervisor::{Supervisor, SupervisorError};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("supervisor is not running")]
    Closed,
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Facade(#[from] FacadeError),
}

pub type Result<T> = std::result::Result<T, HandleError>;

/// Commands processed by the supervisor task.
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Raw recognizer output.
    Nlp {
        nlp: Value,
        action: Value,
        reply: oneshot::Sender<std::result::Result<(), SupervisorError>>,
    },
    /// Speech pipeline progress or result.
    Speech {
        event: SpeechEvent,
        reply: oneshot::Sender<std::result::Result<(), SupervisorError>>,
    },
    /// Message pushed on the cloud channel. Fire-and-forget.
    Cloud { topic: String, message: String },
    Register {
        app_id: AppId,
        connection: ConnectionDescriptor,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        app_id: AppId,
        reply: oneshot::Sender<Outcome>,
    },
    Start {
        app_id: AppId,
        reply: oneshot::Sender<()>,
    },
    SetPickup {
        app_id: AppId,
        enabled: bool,
        reply: oneshot::Sender<std::result::Result<Outcome, FacadeError>>,
    },
    Exit {
        app_id: AppId,
        reply: oneshot::Sender<std::result::Result<Outcome, FacadeError>>,
    },
    Speak {
        app_id: AppId,
        text: String,
        reply: oneshot::Sender<std::result::Result<Id, FacadeError>>,
    },
    CheckPermission {
        app_id: AppId,
        permission: String,
        reply: oneshot::Sender<std::result::Result<(), FacadeError>>,
    },
    IsAlive {
        app_id: AppId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<StackSnapshot>,
    },
}

impl SupervisorCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Nlp { .. } => "nlp",
            Self::Speech { .. } => "speech",
            Self::Cloud { .. } => "cloud",
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::Start { .. } => "start",
            Self::SetPickup { .. } => "set_pickup",
            Self::Exit { .. } => "exit",
            Self::Speak { .. } => "speak",
            Self::CheckPermission { .. } => "check_permission",
            Self::IsAlive { .. } => "is_alive",
            Self::Snapshot { .. } => "snapshot",
        }
    }
}

/// Apply one command. A caller that stopped waiting is not an error.
fn dispatch(supervisor: &mut Supervisor, command: SupervisorCommand) {
    match command {
        SupervisorCommand::Nlp { nlp, action, reply } => {
            let _ = reply.send(supervisor.on_nlp(nlp, action));
        }
        SupervisorCommand::Speech { event, reply } => {
            let _ = reply.send(supervisor.on_speech_event(event));
        }
        SupervisorCommand::Cloud { topic, message } => {
            supervisor.on_mqtt_message(&topic, &message);
        }
        SupervisorCommand::Register {
            app_id,
            connection,
            reply,
        } => {
            supervisor.register(app_id, connection);
            let _ = reply.send(());
        }
        SupervisorCommand::Unregister { app_id, reply } => {
            let _ = reply.send(supervisor.unregister(&app_id));
        }
        SupervisorCommand::Start { app_id, reply } => {
            supervisor.start(&app_id);
            let _ = reply.send(());
        }
        SupervisorCommand::SetPickup {
            app_id,
            enabled,
            reply,
        } => {
            let _ = reply.send(supervisor.set_pickup(&app_id, enabled));
        }
        SupervisorCommand::Exit { app_id, reply } => {
            let _ = reply.send(supervisor.exit(&app_id));
        }
        SupervisorCommand::Speak {
            app_id,
            text,
            reply,
        } => {
            let _ = reply.send(supervisor.speak(&app_id, &text));
        }
        SupervisorCommand::CheckPermission {
            app_id,
            permission,
            reply,
        } => {
            let _ = reply.send(supervisor.check_permission(&app_id, &permission));
        }
        SupervisorCommand::IsAlive { app_id, reply } => {
            let _ = reply.send(supervisor.is_app_alive(&app_id));
        }
        SupervisorCommand::Snapshot { reply } => {
            let _ = reply.send(supervisor.snapshot());
        }
    }
}

/// Start the supervisor task.
///
/// The task runs until `cancel` fires or every handle is dropped, then tears
/// down all running apps and returns the supervisor.
pub fn spawn(
    mut supervisor: Supervisor,
    capacity: usize,
    cancel: CancellationToken,
) -> (SupervisorHandle, JoinHandle<Supervisor>) {
    let (tx, mut rx) = mpsc::channel::<SupervisorCommand>(capacity);

    let task = tokio::spawn(async move {
        info!(skills = supervisor.registry().len(), "supervisor accepting requests");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("supervisor cancelled");
                    break;
                }
                command = rx.recv() => {
                    let Some(command) = command else {
                        debug!("all supervisor handles dropped");
                        break;
                    };
                    debug!(command = command.name(), "supervisor command");
                    dispatch(&mut supervisor, command);
                }
            }
        }
        rx.close();
        supervisor.shutdown();
        supervisor
    });

    (SupervisorHandle { tx }, task)
}

/// Cloneable request/response channel to the supervisor task.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SupervisorCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| HandleError::Closed)?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    /// Route raw recognizer output.
    pub async fn nlp(&self, nlp: Value, action: Value) -> Result<()> {
        self.call(|reply| SupervisorCommand::Nlp { nlp, action, reply })
            .await?
            .map_err(HandleError::from)
    }

    pub async fn speech_event(&self, event: SpeechEvent) -> Result<()> {
        self.call(|reply| SupervisorCommand::Speech { event, reply })
            .await?
            .map_err(HandleError::from)
    }

    /// Queue a cloud channel message without waiting for it to be handled.
    pub async fn cloud_message(&self, topic: impl Into<String>, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(SupervisorCommand::Cloud {
                topic: topic.into(),
                message: message.into(),
            })
            .await
            .map_err(|_| HandleError::Closed)
    }

    pub async fn register(&self, app_id: AppId, connection: ConnectionDescriptor) -> Result<()> {
        self.call(|reply| SupervisorCommand::Register {
            app_id,
            connection,
            reply,
        })
        .await
    }

    pub async fn unregister(&self, app_id: AppId) -> Result<Outcome> {
        self.call(|reply| SupervisorCommand::Unregister { app_id, reply })
            .await
    }

    pub async fn start(&self, app_id: AppId) -> Result<()> {
        self.call(|reply| SupervisorCommand::Start { app_id, reply })
            .await
    }

    pub async fn set_pickup(&self, app_id: AppId, enabled: bool) -> Result<Outcome> {
        self.call(|reply| SupervisorCommand::SetPickup {
            app_id,
            enabled,
            reply,
        })
        .await?
        .map_err(HandleError::from)
    }

    pub async fn exit(&self, app_id: AppId) -> Result<Outcome> {
        self.call(|reply| SupervisorCommand::Exit { app_id, reply })
            .await?
            .map_err(HandleError::from)
    }

    pub async fn speak(&self, app_id: AppId, text: impl Into<String>) -> Result<Id> {
        let text = text.into();
        self.call(|reply| SupervisorCommand::Speak {
            app_id,
            text,
            reply,
        })
        .await?
        .map_err(HandleError::from)
    }

    pub async fn check_permission(&self, app_id: AppId, permission: impl Into<String>) -> Result<()> {
        let permission = permission.into();
        self.call(|reply| SupervisorCommand::CheckPermission {
            app_id,
            permission,
            reply,
        })
        .await?
        .map_err(HandleError::from)
    }

    pub async fn is_app_alive(&self, app_id: AppId) -> Result<bool> {
        self.call(|reply| SupervisorCommand::IsAlive { app_id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<StackSnapshot> {
        self.call(|reply| SupervisorCommand::Snapshot { reply }).await
    }
}
