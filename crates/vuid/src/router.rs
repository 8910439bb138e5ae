//! Command routing decisions.
//!
//! [`route`] is pure: it looks at the incoming command and the current
//! foreground and returns the ordered transitions to apply. The supervisor
//! applies them against the lifecycle stack.

use std::fmt;

use vui_core::{AppId, CommandContext};

/// One lifecycle stack mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Deliver the command to the already running instance.
    Request(AppId),
    /// Destroy every running instance.
    DestroyAll,
    Destroy(AppId),
    Pause(AppId),
    Resume(AppId),
    /// Instantiate the command's target and push it as foreground.
    Create(AppId),
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(id) => write!(f, "request({id})"),
            Self::DestroyAll => f.write_str("destroy-all"),
            Self::Destroy(id) => write!(f, "destroy({id})"),
            Self::Pause(id) => write!(f, "pause({id})"),
            Self::Resume(id) => write!(f, "resume({id})"),
            Self::Create(id) => write!(f, "create({id})"),
        }
    }
}

/// Decide the transitions for `command` given the current foreground
/// identifier and its context.
///
/// 1. Same effective identifier as the foreground: request only.
/// 2. Scene command: destroy everything, then create and request.
/// 3. Otherwise the foreground is destroyed (cut) or paused (scene), then
///    the target is created and requested.
pub fn route(command: &CommandContext, foreground: Option<(&AppId, &CommandContext)>) -> Vec<Transition> {
    let target = command.effective_id();

    if let Some((current, _)) = foreground {
        if *current == target {
            return vec![Transition::Request(target)];
        }
    }

    let mut plan = Vec::with_capacity(3);
    if command.form.is_scene() {
        plan.push(Transition::DestroyAll);
    } else if let Some((current, context)) = foreground {
        if context.form.is_scene() {
            plan.push(Transition::Pause(current.clone()));
        } else {
            plan.push(Transition::Destroy(current.clone()));
        }
    }
    plan.push(Transition::Create(target.clone()));
    plan.push(Transition::Request(target));
    plan
}
