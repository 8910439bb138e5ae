//! Parsing of recognizer output into routable commands.
//!
//! A command is accepted only when every field the router needs is present,
//! so a malformed command is rejected before any lifecycle state changes.

use crate::types::{AppId, CommandContext, CommandForm};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid json: {0}")]
    InvalidJson(String),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Event produced by the speech pipeline.
///
/// Only [`SpeechEvent::Nlp`] carries a routable command; the others mark
/// progress of an utterance and are informational.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    VoiceComing,
    VoiceAccept,
    AsrEnd,
    Nlp {
        asr: String,
        nlp: Value,
        action: Value,
    },
}

impl SpeechEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceComing => "voice coming",
            Self::VoiceAccept => "voice accept",
            Self::AsrEnd => "asr end",
            Self::Nlp { .. } => "nlp",
        }
    }
}

/// Build a [`CommandContext`] from raw `nlp` and `action` values.
///
/// Required: `nlp.appId` (string) and `action.response.action.form` (string).
/// `nlp.cloud` counts as cloud identity only when it is literally `true`.
pub fn parse_command(nlp: Value, action: Value) -> Result<CommandContext> {
    let app_id = nlp
        .get("appId")
        .and_then(Value::as_str)
        .ok_or(CommandError::MissingField("nlp.appId"))?
        .to_string();
    let form = action
        .pointer("/response/action/form")
        .and_then(Value::as_str)
        .ok_or(CommandError::MissingField("action.response.action.form"))?;
    let form = CommandForm::parse(form);
    let cloud = nlp.get("cloud").and_then(Value::as_bool) == Some(true);

    Ok(CommandContext {
        app_id: AppId::new(app_id),
        cloud,
        form,
        nlp,
        action,
    })
}

/// Parse a `cloud_forward` message into a command.
///
/// The message is a JSON object whose `content.params` field is itself a
/// JSON-encoded string holding `nlp` and `action`.
pub fn parse_cloud_forward(message: &str) -> Result<CommandContext> {
    let msg: Value =
        serde_json::from_str(message).map_err(|e| CommandError::InvalidJson(e.to_string()))?;
    let params = msg
        .pointer("/content/params")
        .and_then(Value::as_str)
        .ok_or(CommandError::MissingField("content.params"))?;
    let mut params: Value =
        serde_json::from_str(params).map_err(|e| CommandError::InvalidJson(e.to_string()))?;

    let nlp = params
        .get_mut("nlp")
        .map(Value::take)
        .ok_or(CommandError::MissingField("params.nlp"))?;
    let action = params
        .get_mut("action")
        .map(Value::take)
        .ok_or(CommandError::MissingField("params.action"))?;

    parse_command(nlp, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(form: &str) -> Value {
        json!({ "response": { "action": { "form": form } } })
    }

    #[test]
    fn parses_local_command() {
        let cmd = parse_command(json!({"appId": "weather"}), action("cut")).unwrap();
        assert_eq!(cmd.app_id, "weather");
        assert!(!cmd.cloud);
        assert_eq!(cmd.form, CommandForm::Cut);
        assert_eq!(cmd.effective_id(), "weather");
    }

    #[test]
    fn parses_cloud_scene_command() {
        let cmd = parse_command(json!({"appId": "music", "cloud": true}), action("scene")).unwrap();
        assert!(cmd.cloud);
        assert_eq!(cmd.form, CommandForm::Scene);
        assert_eq!(cmd.effective_id(), AppId::cloud());
    }

    #[test]
    fn non_boolean_cloud_is_local() {
        let cmd = parse_command(json!({"appId": "a", "cloud": "true"}), action("cut")).unwrap();
        assert!(!cmd.cloud);
    }

    #[test]
    fn missing_app_id_is_rejected() {
        let err = parse_command(json!({"intent": "x"}), action("cut")).unwrap_err();
        assert_eq!(err, CommandError::MissingField("nlp.appId"));
    }

    #[test]
    fn missing_form_is_rejected() {
        let err = parse_command(json!({"appId": "a"}), json!({"response": {}})).unwrap_err();
        assert_eq!(err, CommandError::MissingField("action.response.action.form"));

        let err = parse_command(json!({"appId": "a"}), Value::Null).unwrap_err();
        assert_eq!(err, CommandError::MissingField("action.response.action.form"));
    }

    #[test]
    fn parses_cloud_forward_message() {
        let params = json!({
            "nlp": {"appId": "alarm"},
            "action": action("cut"),
        })
        .to_string();
        let message = json!({ "content": { "params": params } }).to_string();

        let cmd = parse_cloud_forward(&message).unwrap();
        assert_eq!(cmd.app_id, "alarm");
        assert_eq!(cmd.form, CommandForm::Cut);
    }

    #[test]
    fn cloud_forward_rejects_bad_json() {
        assert!(matches!(
            parse_cloud_forward("not json"),
            Err(CommandError::InvalidJson(_))
        ));

        let message = json!({ "content": { "params": "{broken" } }).to_string();
        assert!(matches!(
            parse_cloud_forward(&message),
            Err(CommandError::InvalidJson(_))
        ));
    }

    #[test]
    fn cloud_forward_requires_params_string() {
        let message = json!({ "content": { "params": {"nlp": {}} } }).to_string();
        assert_eq!(
            parse_cloud_forward(&message).unwrap_err(),
            CommandError::MissingField("content.params")
        );
    }
}
