//! Per-application permission records.
//!
//! Grants are populated when a package is loaded or an external application
//! registers. Command routing only ever reads them.

use std::collections::{BTreeSet, HashMap};
use vui_core::AppId;

/// In-memory permission store keyed by application identifier.
#[derive(Debug, Default)]
pub struct PermissionGate {
    grants: HashMap<AppId, BTreeSet<String>>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant permissions to an application, extending any prior grants.
    ///
    /// Granting an empty set still creates a (empty) record for the id.
    pub fn grant<I, S>(&mut self, app_id: &AppId, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(app_id.clone())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
    }

    /// Whether `app_id` holds `permission`.
    pub fn check(&self, app_id: &AppId, permission: &str) -> bool {
        self.grants
            .get(app_id)
            .is_some_and(|set| set.contains(permission))
    }

    /// Drop every grant of an application. Returns whether a record existed.
    pub fn revoke_all(&mut self, app_id: &AppId) -> bool {
        self.grants.remove(app_id).is_some()
    }

    pub fn permissions_of(&self, app_id: &AppId) -> Option<&BTreeSet<String>> {
        self.grants.get(app_id)
    }

    pub fn contains(&self, app_id: &AppId) -> bool {
        self.grants.contains_key(app_id)
    }
}
