//! Supervisor context: owns the registry, permissions, and lifecycle stack,
//! and applies routing decisions to them.
//!
//! Nothing here is shared. The actor task owns the one `Supervisor` and
//! calls into it one request at a time.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vui_core::{
    parse_cloud_forward, parse_command, AppId, CommandContext, CommandError, Config, EntryState,
    LifecycleEvent, Notification, SpeechEvent,
};

use crate::app::{AppLauncher, LaunchError, RunningApp};
use crate::notify::Notifier;
use crate::permission::PermissionGate;
use crate::registry::ExecutorRegistry;
use crate::router::{route, Transition};
use crate::speech::SpeechSynthesizer;
use crate::stack::{LifecycleStack, StackSnapshot};

/// Topic carrying voice commands relayed from the cloud.
pub const TOPIC_CLOUD_FORWARD: &str = "cloud_forward";
/// Topic asking the device to reset its settings.
pub const TOPIC_RESET_SETTINGS: &str = "reset_settings";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("malformed command: {0}")]
    Command(#[from] CommandError),
    #[error("no executor registered for {0}")]
    NoExecutor(AppId),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug)]
pub struct Supervisor {
    pub(crate) registry: ExecutorRegistry,
    pub(crate) permissions: PermissionGate,
    pub(crate) stack: LifecycleStack,
    pub(crate) launcher: Arc<dyn AppLauncher>,
    pub(crate) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(crate) notifier: Notifier,
    pub(crate) external_permissions: Vec<String>,
    pub(crate) strict_foreground: bool,
}

impl Supervisor {
    /// Build a supervisor around an already loaded registry.
    pub fn new(
        registry: ExecutorRegistry,
        permissions: PermissionGate,
        launcher: Arc<dyn AppLauncher>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        notifier: Notifier,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            permissions,
            stack: LifecycleStack::new(),
            launcher,
            synthesizer,
            notifier,
            external_permissions: config.external_permissions.clone(),
            strict_foreground: config.strict_foreground,
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn permissions(&self) -> &PermissionGate {
        &self.permissions
    }

    pub fn stack(&self) -> &LifecycleStack {
        &self.stack
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn snapshot(&self) -> StackSnapshot {
        self.stack.snapshot()
    }

    pub fn is_app_alive(&self, app_id: &AppId) -> bool {
        self.stack.is_alive(app_id)
    }

    pub fn context_of(&self, app_id: &AppId) -> Option<&CommandContext> {
        self.stack.context_of(app_id)
    }

    /// Handle raw recognizer output. Malformed input changes nothing.
    pub fn on_nlp(&mut self, nlp: Value, action: Value) -> Result<()> {
        let command = parse_command(nlp, action).inspect_err(|e| {
            warn!(error = %e, "dropping malformed voice command");
        })?;
        self.on_voice_command(command)
    }

    /// Route one parsed voice command and apply the resulting transitions.
    pub fn on_voice_command(&mut self, command: CommandContext) -> Result<()> {
        let foreground = self
            .stack
            .current_app_id()
            .and_then(|id| self.stack.context_of(id).map(|ctx| (id, ctx)));
        let plan = route(&command, foreground);
        let steps: Vec<String> = plan.iter().map(ToString::to_string).collect();
        info!(
            app_id = %command.app_id,
            cloud = command.cloud,
            form = command.form.as_str(),
            plan = %steps.join(", "),
            "voice command"
        );
        self.apply(&command, plan)
    }

    /// Apply a plan in order, publishing the stack summary after each step.
    ///
    /// A failed create aborts the rest of the plan and resumes any app this
    /// plan paused, so the uncovered foreground is never left paused.
    pub fn apply(&mut self, command: &CommandContext, plan: Vec<Transition>) -> Result<()> {
        let mut paused = Vec::new();
        for transition in plan {
            let result = match &transition {
                Transition::Request(id) => {
                    self.request(id, command);
                    Ok(())
                }
                Transition::DestroyAll => {
                    self.destroy_all();
                    Ok(())
                }
                Transition::Destroy(id) => {
                    self.destroy(id);
                    Ok(())
                }
                Transition::Pause(id) => {
                    if self.pause(id) {
                        paused.push(id.clone());
                    }
                    Ok(())
                }
                Transition::Resume(id) => {
                    self.resume(id);
                    Ok(())
                }
                Transition::Create(_) => self.create(command),
            };
            self.publish_stack();

            if let Err(e) = result {
                warn!(transition = %transition, error = %e, "transition failed, plan aborted");
                for id in paused.iter().rev() {
                    if self.resume(id) {
                        self.publish_stack();
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Instantiate the command's target and push it as the new foreground.
    pub fn create(&mut self, command: &CommandContext) -> Result<()> {
        let app_id = command.effective_id();
        let Some(executor) = self.registry.get(&app_id) else {
            warn!(app_id = %app_id, "no executor registered, cannot create");
            return Err(SupervisorError::NoExecutor(app_id));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.launcher.launch(&app_id, &executor, rx)?;

        let app = RunningApp::new(app_id.clone(), tx);
        app.emit(LifecycleEvent::Create {
            nlp: command.nlp.clone(),
            action: command.action.clone(),
        });
        self.stack.push(app, command.clone());
        info!(app_id = %app_id, form = command.form.as_str(), "app created");
        Ok(())
    }

    /// Deliver a command to a running instance and remember it as its
    /// latest context.
    pub fn request(&mut self, app_id: &AppId, command: &CommandContext) -> bool {
        let Some(app) = self.stack.app(app_id) else {
            debug!(app_id = %app_id, "request for app that is not running");
            return false;
        };
        app.emit(LifecycleEvent::Request {
            nlp: command.nlp.clone(),
            action: command.action.clone(),
        });
        self.stack.update_context(app_id, command.clone());
        true
    }

    /// Send `destroy` and remove the instance. No-op for unknown identifiers.
    pub fn destroy(&mut self, app_id: &AppId) -> bool {
        match self.stack.remove_by_id(app_id) {
            Some(app) => {
                app.emit(LifecycleEvent::Destroy);
                info!(app_id = %app_id, "app destroyed");
                true
            }
            None => {
                debug!(app_id = %app_id, "destroy for app that is not running");
                false
            }
        }
    }

    pub fn destroy_all(&mut self) -> usize {
        let count = self.stack.clear();
        if count > 0 {
            info!(count, "all apps destroyed");
        }
        count
    }

    pub fn pause(&mut self, app_id: &AppId) -> bool {
        self.signal(app_id, EntryState::Paused, LifecycleEvent::Pause)
    }

    pub fn resume(&mut self, app_id: &AppId) -> bool {
        self.signal(app_id, EntryState::Active, LifecycleEvent::Resume)
    }

    fn signal(&mut self, app_id: &AppId, state: EntryState, event: LifecycleEvent) -> bool {
        let Some(app) = self.stack.app(app_id) else {
            debug!(app_id = %app_id, event = event.as_str(), "app is not running");
            return false;
        };
        app.emit(event);
        self.stack.set_state(app_id, state)
    }

    /// Voluntary termination: destroy the app, then resume the uncovered
    /// foreground if it is a paused scene.
    pub fn exit_app(&mut self, app_id: &AppId) -> bool {
        if !self.destroy(app_id) {
            return false;
        }
        self.publish_stack();

        let uncovered = self
            .stack
            .current_context()
            .filter(|ctx| ctx.form.is_scene())
            .map(CommandContext::effective_id);
        if let Some(scene) = uncovered {
            self.resume(&scene);
            self.publish_stack();
        }
        true
    }

    pub fn on_speech_event(&mut self, event: SpeechEvent) -> Result<()> {
        match event {
            SpeechEvent::Nlp { asr, nlp, action } => {
                debug!(asr = %asr, "speech recognized");
                self.on_nlp(nlp, action)
            }
            other => {
                debug!(event = other.as_str(), "speech event");
                Ok(())
            }
        }
    }

    /// Handle a message pushed from the cloud channel.
    ///
    /// Parse failures are logged; nothing on this path is fatal.
    pub fn on_mqtt_message(&mut self, topic: &str, message: &str) {
        match topic {
            TOPIC_CLOUD_FORWARD => match parse_cloud_forward(message) {
                Ok(command) => {
                    if let Err(e) = self.on_voice_command(command) {
                        warn!(topic, error = %e, "cloud forwarded command failed");
                    }
                }
                Err(e) => warn!(topic, error = %e, "invalid cloud forward message"),
            },
            TOPIC_RESET_SETTINGS => warn!(topic, "settings reset is not supported"),
            _ => debug!(topic, "ignoring message"),
        }
    }

    /// Destroy every running app. Called once when the actor stops.
    pub fn shutdown(&mut self) {
        let count = self.destroy_all();
        self.publish_stack();
        info!(count, "supervisor stopped");
    }

    pub(crate) fn publish_stack(&self) {
        self.notifier
            .publish(Notification::set_stack(self.stack.summary()));
    }
}
