//! Application package descriptors.
//!
//! A package directory carries a `package.json` descriptor. Only the fields
//! the supervisor needs are extracted: the declared skill identifiers, the
//! requested permissions, the optional entry file, and the connection
//! descriptor of out-of-process applications.

use crate::types::{AppId, ConnectionDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// File name of the descriptor inside a package directory.
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Error type for descriptor parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageError {
    #[error("invalid descriptor: {0}")]
    InvalidJson(String),
    #[error("empty skill identifier at index {0}")]
    EmptySkill(usize),
}

/// Raw descriptor as parsed from JSON.
#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    name: Option<String>,
    main: Option<String>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    permission: Vec<String>,
    #[serde(rename = "dbusConn")]
    connection: Option<ConnectionDescriptor>,
}

/// Package metadata shared by every skill of one package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppProfile {
    /// Package name, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entry file relative to the package directory, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Skill identifiers in declaration order.
    pub skills: Vec<AppId>,
    /// Requested permission names.
    pub permissions: BTreeSet<String>,
    /// Present for out-of-process applications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDescriptor>,
}

impl AppProfile {
    /// Profile of an application registered at runtime rather than loaded
    /// from a package directory.
    pub fn external(app_id: AppId, connection: ConnectionDescriptor) -> Self {
        Self {
            name: None,
            main: None,
            skills: vec![app_id],
            permissions: BTreeSet::new(),
            connection: Some(connection),
        }
    }

    pub fn is_external(&self) -> bool {
        self.connection.is_some()
    }
}

/// Parse a `package.json` descriptor.
///
/// `metadata`, `metadata.skills` and `metadata.permission` are optional and
/// default to empty. Skill identifiers must be non-empty and unique within
/// the package.
pub fn parse_descriptor(content: &str) -> Result<AppProfile, PackageError> {
    let raw: RawDescriptor =
        serde_json::from_str(content).map_err(|e| PackageError::InvalidJson(e.to_string()))?;

    let mut skills = Vec::with_capacity(raw.metadata.skills.len());
    for (index, skill) in raw.metadata.skills.into_iter().enumerate() {
        if skill.is_empty() {
            return Err(PackageError::EmptySkill(index));
        }
        skills.push(AppId::new(skill));
    }

    Ok(AppProfile {
        name: raw.name,
        main: raw.main,
        skills,
        permissions: raw.metadata.permission.into_iter().collect(),
        connection: raw.metadata.connection,
    })
}
