//! Lifecycle stack: which applications are running, and in what order.
//!
//! The last entry is the foreground application. The running-instance and
//! command-context maps always hold exactly the identifiers on the stack,
//! and every identifier appears on the stack at most once.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use vui_core::{AppId, CommandContext, EntryState, LifecycleEvent};

use crate::app::RunningApp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEntry {
    pub app_id: AppId,
    pub state: EntryState,
}

/// Point-in-time view of the stack, bottom first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSnapshot {
    pub entries: Vec<StackEntry>,
    pub summary: String,
}

#[derive(Debug, Default)]
pub struct LifecycleStack {
    entries: Vec<StackEntry>,
    apps: HashMap<AppId, RunningApp>,
    contexts: HashMap<AppId, CommandContext>,
}

impl LifecycleStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_app_id(&self) -> Option<&AppId> {
        self.entries.last().map(|entry| &entry.app_id)
    }

    pub fn current_context(&self) -> Option<&CommandContext> {
        self.current_app_id().and_then(|id| self.contexts.get(id))
    }

    pub fn current_app(&self) -> Option<&RunningApp> {
        self.current_app_id().and_then(|id| self.apps.get(id))
    }

    pub fn context_of(&self, app_id: &AppId) -> Option<&CommandContext> {
        self.contexts.get(app_id)
    }

    pub fn app(&self, app_id: &AppId) -> Option<&RunningApp> {
        self.apps.get(app_id)
    }

    pub fn is_alive(&self, app_id: &AppId) -> bool {
        self.apps.contains_key(app_id)
    }

    pub fn state_of(&self, app_id: &AppId) -> Option<EntryState> {
        self.entries
            .iter()
            .find(|entry| &entry.app_id == app_id)
            .map(|entry| entry.state)
    }

    /// Tag an entry's state. Returns false if the identifier is not on the stack.
    pub fn set_state(&mut self, app_id: &AppId, state: EntryState) -> bool {
        match self.entries.iter_mut().find(|entry| &entry.app_id == app_id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Append a freshly created instance as the new foreground.
    ///
    /// An instance already running under the same identifier is sent
    /// `destroy` and removed first.
    pub fn push(&mut self, app: RunningApp, context: CommandContext) {
        let app_id = app.app_id.clone();
        if let Some(stale) = self.remove_by_id(&app_id) {
            warn!(app_id = %app_id, "replacing stale stack entry");
            stale.emit(LifecycleEvent::Destroy);
        }

        self.entries.push(StackEntry {
            app_id: app_id.clone(),
            state: EntryState::Active,
        });
        self.contexts.insert(app_id.clone(), context);
        self.apps.insert(app_id, app);
    }

    /// Remove the first entry (searching from the bottom) with this
    /// identifier, together with its map entries. No-op if absent.
    ///
    /// No event is sent; callers emit `destroy` themselves.
    pub fn remove_by_id(&mut self, app_id: &AppId) -> Option<RunningApp> {
        let index = self.entries.iter().position(|entry| &entry.app_id == app_id)?;
        self.entries.remove(index);
        self.contexts.remove(app_id);
        self.apps.remove(app_id)
    }

    /// Send `destroy` to every instance, bottom-up, then empty the stack.
    ///
    /// Returns how many instances were torn down.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            if let Some(app) = self.apps.remove(&entry.app_id) {
                app.emit(LifecycleEvent::Destroy);
            }
        }
        self.contexts.clear();
        debug!(count, "lifecycle stack cleared");
        count
    }

    /// Replace the stored context of a running application.
    pub fn update_context(&mut self, app_id: &AppId, context: CommandContext) -> bool {
        match self.contexts.get_mut(app_id) {
            Some(slot) => {
                *slot = context;
                true
            }
            None => false,
        }
    }

    /// `"{scene}:{cut}"`: the nearest scene and nearest non-scene
    /// application, scanning from the top. Either half is empty if none.
    pub fn summary(&self) -> String {
        let mut scene: Option<&str> = None;
        let mut cut: Option<&str> = None;

        for entry in self.entries.iter().rev() {
            let Some(context) = self.contexts.get(&entry.app_id) else {
                continue;
            };
            let slot = if context.form.is_scene() {
                &mut scene
            } else {
                &mut cut
            };
            if slot.is_none() {
                *slot = Some(context.app_id.as_str());
            }
            if scene.is_some() && cut.is_some() {
                break;
            }
        }

        format!("{}:{}", scene.unwrap_or_default(), cut.unwrap_or_default())
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Stack identifiers, bottom first.
    pub fn ids(&self) -> Vec<&AppId> {
        self.entries.iter().map(|entry| &entry.app_id).collect()
    }

    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            entries: self.entries.clone(),
            summary: self.summary(),
        }
    }
}
