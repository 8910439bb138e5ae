//! Outbound notifications for external consumers.
//!
//! Indicator/UI collaborators consume `setStack` and `setPickup`; external
//! applications receive `onTtsComplete` and lifecycle deliveries addressed to
//! their connection descriptor.

use crate::types::{AppId, ConnectionDescriptor, Id, LifecycleEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    SetStack,
    SetPickup,
    #[serde(rename = "onTtsComplete")]
    TtsComplete,
    AppLifecycle,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetStack => "setStack",
            Self::SetPickup => "setPickup",
            Self::TtsComplete => "onTtsComplete",
            Self::AppLifecycle => "appLifecycle",
        }
    }
}

/// Payload for `setStack`.
///
/// `stack` is `"<sceneAppId>:<normalAppId>"`, either half empty when the
/// stack holds no application of that form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStackPayload {
    pub stack: String,
}

/// Payload for `setPickup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPickupPayload {
    pub enabled: bool,
}

/// Payload for `onTtsComplete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsCompletePayload {
    pub app_id: AppId,
    /// Destination of the notification; absent for locally loaded apps.
    pub connection: Option<ConnectionDescriptor>,
    pub handle: Id,
    /// Failure reason; `None` when synthesis completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for `appLifecycle`: a lifecycle event addressed to an
/// out-of-process application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppLifecyclePayload {
    pub app_id: AppId,
    pub connection: ConnectionDescriptor,
    pub event: LifecycleEvent,
}

/// Union type for all notification payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    SetStack(SetStackPayload),
    SetPickup(SetPickupPayload),
    TtsComplete(TtsCompletePayload),
    AppLifecycle(AppLifecyclePayload),
}

impl Notification {
    pub fn set_stack(stack: impl Into<String>) -> Self {
        Self::SetStack(SetStackPayload {
            stack: stack.into(),
        })
    }

    pub fn set_pickup(enabled: bool) -> Self {
        Self::SetPickup(SetPickupPayload { enabled })
    }

    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::SetStack(_) => NotificationType::SetStack,
            Self::SetPickup(_) => NotificationType::SetPickup,
            Self::TtsComplete(_) => NotificationType::TtsComplete,
            Self::AppLifecycle(_) => NotificationType::AppLifecycle,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A notification stamped with an id and emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub id: Id,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub emitted_at: DateTime<Utc>,
    pub payload: Notification,
}

impl NotificationEnvelope {
    pub fn new(payload: Notification) -> Self {
        Self {
            id: Id::new(),
            notification_type: payload.notification_type(),
            emitted_at: Utc::now(),
            payload,
        }
    }
}
