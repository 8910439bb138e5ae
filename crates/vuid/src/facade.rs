//! Procedure-call surface for out-of-process applications.
//!
//! Every call is identified by the caller's own application id. Calls that
//! change what runs are restricted to the foreground application;
//! everything else is gated by the permission records.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use vui_core::events::TtsCompletePayload;
use vui_core::{AppId, ConnectionDescriptor, Id, Notification, ACCESS_TTS};

use crate::speech::SpeechError;
use crate::supervisor::Supervisor;

/// Whether an accepted call had any effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    /// Acknowledged without effect.
    Ignored,
}

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("app is not registered: {0}")]
    UnregisteredApp(AppId),
    #[error("permission {permission} denied for {app_id}")]
    PermissionDenied { app_id: AppId, permission: String },
    #[error("{operation} is only available to the foreground app, {app_id} is not")]
    ForegroundOnlyDenied {
        app_id: AppId,
        operation: &'static str,
    },
    #[error(transparent)]
    Speech(#[from] SpeechError),
}

impl Supervisor {
    /// Install an executor for an out-of-process application. Always succeeds.
    pub fn register(&mut self, app_id: AppId, connection: ConnectionDescriptor) {
        self.registry.register_external(
            &app_id,
            connection,
            &mut self.permissions,
            &self.external_permissions,
        );
    }

    /// Remove an external application, destroying it first if it is running.
    pub fn unregister(&mut self, app_id: &AppId) -> Outcome {
        let external = self
            .registry
            .get(app_id)
            .is_some_and(|executor| executor.is_external());
        if !external {
            debug!(app_id = %app_id, "unregister ignored, not an external app");
            return Outcome::Ignored;
        }

        if self.stack.is_alive(app_id) {
            self.exit_app(app_id);
        }
        self.registry
            .unregister_external(app_id, &mut self.permissions);
        Outcome::Applied
    }

    /// Acknowledge that an application has started.
    pub fn start(&self, app_id: &AppId) {
        debug!(app_id = %app_id, registered = self.registry.contains(app_id), "app start");
    }

    pub fn set_pickup(&mut self, app_id: &AppId, enabled: bool) -> Result<Outcome, FacadeError> {
        if !self.is_foreground(app_id) {
            return self.foreground_denied(app_id, "setPickup");
        }
        info!(app_id = %app_id, enabled, "pickup");
        self.notifier.publish(Notification::set_pickup(enabled));
        Ok(Outcome::Applied)
    }

    pub fn exit(&mut self, app_id: &AppId) -> Result<Outcome, FacadeError> {
        if !self.is_foreground(app_id) {
            return self.foreground_denied(app_id, "exit");
        }
        self.exit_app(app_id);
        Ok(Outcome::Applied)
    }

    /// Start speech synthesis for `app_id` and return its handle at once.
    ///
    /// Completion is published later as `onTtsComplete` addressed to the
    /// caller's connection descriptor.
    pub fn speak(&self, app_id: &AppId, text: &str) -> Result<Id, FacadeError> {
        let Some(executor) = self.registry.get(app_id) else {
            return Err(FacadeError::UnregisteredApp(app_id.clone()));
        };
        self.check_permission(app_id, ACCESS_TTS)?;

        let job = self.synthesizer.speak(app_id, text)?;
        let handle = job.handle.clone();

        let notifier = self.notifier.clone();
        let payload_app = app_id.clone();
        let connection = executor.connection().cloned();
        let completion_handle = handle.clone();
        let completion = async move {
            let error = job.wait().await.err().map(|e| e.to_string());
            if let Some(error) = &error {
                warn!(app_id = %payload_app, handle = %completion_handle, error = %error, "speech failed");
            }
            notifier.publish(Notification::TtsComplete(TtsCompletePayload {
                app_id: payload_app,
                connection,
                handle: completion_handle,
                error,
            }));
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(completion);
            }
            Err(_) => warn!(app_id = %app_id, "no runtime, speech completion will not be reported"),
        }
        Ok(handle)
    }

    /// Advisory check; callers enforce the answer at their own boundary.
    pub fn check_permission(&self, app_id: &AppId, permission: &str) -> Result<(), FacadeError> {
        if self.permissions.check(app_id, permission) {
            Ok(())
        } else {
            Err(FacadeError::PermissionDenied {
                app_id: app_id.clone(),
                permission: permission.to_string(),
            })
        }
    }

    fn is_foreground(&self, app_id: &AppId) -> bool {
        self.stack.current_app_id() == Some(app_id)
    }

    fn foreground_denied(
        &self,
        app_id: &AppId,
        operation: &'static str,
    ) -> Result<Outcome, FacadeError> {
        debug!(
            app_id = %app_id,
            operation,
            foreground = ?self.stack.current_app_id(),
            "caller is not the foreground app"
        );
        if self.strict_foreground {
            Err(FacadeError::ForegroundOnlyDenied {
                app_id: app_id.clone(),
                operation,
            })
        } else {
            Ok(Outcome::Ignored)
        }
    }
}
