//! Core types for the voice-skill supervisor.
//!
//! Identifiers, command contexts, and the lifecycle vocabulary shared by the
//! registry, the lifecycle stack, and the command router.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for speech handles and notifications.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Skill application identifier.
///
/// Every skill identifier declared by a package maps to one executor. The
/// synthetic [`AppId::CLOUD`] slot is shared by all cloud-originated commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Identifier of the shared cloud slot.
    pub const CLOUD: &'static str = "@cloud";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn cloud() -> Self {
        Self(Self::CLOUD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cloud(&self) -> bool {
        self.0 == Self::CLOUD
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AppId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for AppId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AppId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Permission allowing an application to request speech synthesis.
pub const ACCESS_TTS: &str = "ACCESS_TTS";
/// Permission allowing an application to control media playback.
pub const ACCESS_MULTIMEDIA: &str = "ACCESS_MULTIMEDIA";

// --- Enumerations ---

/// Presentation form of a command.
///
/// A `scene` tears down every running application when it arrives and is
/// paused (not destroyed) when a normal command stacks on top of it. Every
/// other form string is treated as a normal `cut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandForm {
    Scene,
    #[default]
    Cut,
}

impl CommandForm {
    pub fn parse(form: &str) -> Self {
        if form == "scene" {
            Self::Scene
        } else {
            Self::Cut
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Cut => "cut",
        }
    }

    pub fn is_scene(&self) -> bool {
        matches!(self, Self::Scene)
    }
}

/// State of an entry on the lifecycle stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    Active,
    /// Covered by a newer application but still alive; resumed when uncovered.
    Paused,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

/// Snapshot of the voice command that most recently targeted an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Skill identifier reported by the recognizer.
    pub app_id: AppId,
    /// Whether the command was produced under cloud identity.
    pub cloud: bool,
    pub form: CommandForm,
    pub nlp: Value,
    pub action: Value,
}

impl CommandContext {
    /// Identifier the command is routed to: [`AppId::CLOUD`] for cloud
    /// commands, the raw skill identifier otherwise.
    pub fn effective_id(&self) -> AppId {
        if self.cloud {
            AppId::cloud()
        } else {
            self.app_id.clone()
        }
    }
}

/// Event delivered to a running application instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Create { nlp: Value, action: Value },
    Request { nlp: Value, action: Value },
    Pause,
    Resume,
    Destroy,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Request { .. } => "request",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Destroy => "destroy",
        }
    }
}

/// Where asynchronous notifications for an out-of-process application go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(rename = "objectPath")]
    pub object_path: String,
    #[serde(rename = "ifaceName")]
    pub interface: String,
}

impl ConnectionDescriptor {
    pub fn new(object_path: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            object_path: object_path.into(),
            interface: interface.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(app_id: &str, cloud: bool) -> CommandContext {
        CommandContext {
            app_id: AppId::from(app_id),
            cloud,
            form: CommandForm::Cut,
            nlp: Value::Null,
            action: Value::Null,
        }
    }

    #[test]
    fn effective_id_uses_cloud_slot() {
        assert_eq!(context("weather", true).effective_id(), AppId::cloud());
        assert_eq!(context("weather", false).effective_id(), "weather");
    }

    #[test]
    fn only_scene_string_is_scene() {
        assert_eq!(CommandForm::parse("scene"), CommandForm::Scene);
        assert_eq!(CommandForm::parse("cut"), CommandForm::Cut);
        assert_eq!(CommandForm::parse("Scene"), CommandForm::Cut);
        assert_eq!(CommandForm::parse(""), CommandForm::Cut);
    }

    #[test]
    fn lifecycle_event_serializes_with_tag() {
        let json = serde_json::to_value(LifecycleEvent::Pause).unwrap();
        assert_eq!(json["event"], "pause");

        let json = serde_json::to_value(LifecycleEvent::Create {
            nlp: serde_json::json!({"appId": "a"}),
            action: Value::Null,
        })
        .unwrap();
        assert_eq!(json["event"], "create");
        assert_eq!(json["nlp"]["appId"], "a");
    }

    #[test]
    fn connection_descriptor_uses_wire_names() {
        let desc = ConnectionDescriptor::new("/ext/app", "com.example.app");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("objectPath"));
        assert!(json.contains("ifaceName"));
    }
}
