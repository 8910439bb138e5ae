//! Application executor registry: package loading and runtime registration.
//!
//! Package directories are loaded strictly in order, and the packages inside
//! each directory in file-name order, one at a time. Conflict detection is
//! therefore deterministic: the first package to declare a skill identifier
//! owns it, and a second declaration aborts the whole load pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use vui_core::{parse_descriptor, AppId, AppProfile, ConnectionDescriptor, DESCRIPTOR_FILE};

use crate::permission::PermissionGate;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("skill conflicts: {skill} declared by {} is already registered", .package.display())]
    Conflict { skill: AppId, package: PathBuf },
}

/// Where an executor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOrigin {
    /// Loaded from a package directory.
    Local(PathBuf),
    /// Registered at runtime through the procedure-call surface.
    External,
}

/// Executor shared by every skill identifier of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppExecutor {
    pub skills: Vec<AppId>,
    pub valid: bool,
    /// Present iff `valid` is false.
    pub errmsg: Option<String>,
    pub profile: AppProfile,
    pub origin: ExecutorOrigin,
}

impl AppExecutor {
    /// Build the executor for a package directory.
    ///
    /// A package that declares a `main` entry must ship that file.
    pub async fn from_package(dir: &Path, profile: AppProfile) -> Self {
        let errmsg = match &profile.main {
            Some(main) => {
                let entry = dir.join(main);
                match tokio::fs::try_exists(&entry).await {
                    Ok(true) => None,
                    Ok(false) => Some(format!("entry not found: {}", entry.display())),
                    Err(e) => Some(format!("entry unreadable: {}: {e}", entry.display())),
                }
            }
            None => None,
        };

        Self {
            skills: profile.skills.clone(),
            valid: errmsg.is_none(),
            errmsg,
            profile,
            origin: ExecutorOrigin::Local(dir.to_path_buf()),
        }
    }

    /// Executor for an out-of-process application.
    pub fn external(app_id: AppId, connection: ConnectionDescriptor) -> Self {
        let profile = AppProfile::external(app_id, connection);
        Self {
            skills: profile.skills.clone(),
            valid: true,
            errmsg: None,
            profile,
            origin: ExecutorOrigin::External,
        }
    }

    pub fn is_external(&self) -> bool {
        self.origin == ExecutorOrigin::External
    }

    pub fn connection(&self) -> Option<&ConnectionDescriptor> {
        self.profile.connection.as_ref()
    }
}

/// Why a package was skipped during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Descriptor missing, unreadable, or malformed.
    DescriptorUnreadable(String),
    /// Descriptor parsed but the executor is unusable.
    InvalidExecutor(String),
}

/// A package that did not load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPackage {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of a load pass that did not hit a fatal conflict.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Loaded package directories, in load order.
    pub loaded: Vec<PathBuf>,
    pub skipped: Vec<SkippedPackage>,
}

/// Table of executors keyed by skill identifier.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AppId, Arc<AppExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_id: &AppId) -> Option<Arc<AppExecutor>> {
        self.executors.get(app_id).map(Arc::clone)
    }

    pub fn contains(&self, app_id: &AppId) -> bool {
        self.executors.contains_key(app_id)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Registered skill identifiers, sorted.
    pub fn skills(&self) -> Vec<&AppId> {
        let mut skills: Vec<_> = self.executors.keys().collect();
        skills.sort();
        skills
    }

    /// Load every package found under `dirs`.
    ///
    /// Unreadable directories and packages are logged and skipped. A skill
    /// identifier declared twice aborts the pass with [`LoadError::Conflict`];
    /// packages loaded before the conflict stay registered.
    pub async fn load_all(
        &mut self,
        dirs: &[PathBuf],
        permissions: &mut PermissionGate,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();

        for dir in dirs {
            let packages = match list_packages(dir).await {
                Ok(packages) => packages,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to read app directory");
                    continue;
                }
            };
            debug!(path = %dir.display(), count = packages.len(), "scanning app directory");

            for package in packages {
                self.load_package(&package, permissions, &mut report)
                    .await?;
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            skills = self.executors.len(),
            "app load complete"
        );
        Ok(report)
    }

    async fn load_package(
        &mut self,
        package: &Path,
        permissions: &mut PermissionGate,
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        let descriptor_path = package.join(DESCRIPTOR_FILE);
        let content = match tokio::fs::read_to_string(&descriptor_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %descriptor_path.display(), error = %e, "failed to read package descriptor");
                report.skipped.push(SkippedPackage {
                    path: package.to_path_buf(),
                    reason: SkipReason::DescriptorUnreadable(format!("IO error: {e}")),
                });
                return Ok(());
            }
        };

        let profile = match parse_descriptor(&content) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(path = %descriptor_path.display(), error = %e, "failed to parse package descriptor");
                report.skipped.push(SkippedPackage {
                    path: package.to_path_buf(),
                    reason: SkipReason::DescriptorUnreadable(e.to_string()),
                });
                return Ok(());
            }
        };

        let executor = AppExecutor::from_package(package, profile).await;
        if let Some(errmsg) = &executor.errmsg {
            warn!(path = %package.display(), error = %errmsg, "invalid app package");
            report.skipped.push(SkippedPackage {
                path: package.to_path_buf(),
                reason: SkipReason::InvalidExecutor(errmsg.clone()),
            });
            return Ok(());
        }

        // Check every skill before registering any, so a conflicting package
        // leaves nothing of itself behind. A skill listed twice in one
        // package conflicts with itself.
        let conflict = executor.skills.iter().enumerate().find(|(i, s)| {
            self.executors.contains_key(*s) || executor.skills[..*i].contains(s)
        });
        if let Some((_, skill)) = conflict {
            error!(
                path = %package.display(),
                skill = %skill,
                "skill identifier registered twice"
            );
            return Err(LoadError::Conflict {
                skill: skill.clone(),
                package: package.to_path_buf(),
            });
        }

        let executor = Arc::new(executor);
        for skill in &executor.skills {
            permissions.grant(skill, executor.profile.permissions.iter().cloned());
            self.executors.insert(skill.clone(), Arc::clone(&executor));
        }
        debug!(
            path = %package.display(),
            skills = ?executor.skills,
            "loaded app package"
        );
        report.loaded.push(package.to_path_buf());
        Ok(())
    }

    /// Install an executor for an out-of-process application.
    ///
    /// Replaces any executor already registered under `app_id` and grants
    /// `default_permissions`.
    pub fn register_external(
        &mut self,
        app_id: &AppId,
        connection: ConnectionDescriptor,
        permissions: &mut PermissionGate,
        default_permissions: &[String],
    ) {
        if let Some(previous) = self.executors.get(app_id) {
            if !previous.is_external() {
                warn!(app_id = %app_id, "external registration replaces a loaded package");
            }
        }
        info!(app_id = %app_id, "register external app");
        permissions.grant(app_id, default_permissions.iter().cloned());
        self.executors.insert(
            app_id.clone(),
            Arc::new(AppExecutor::external(app_id.clone(), connection)),
        );
    }

    /// Remove an external executor and its permission record.
    ///
    /// Executors loaded from packages are never removed; returns whether
    /// anything was removed.
    pub fn unregister_external(&mut self, app_id: &AppId, permissions: &mut PermissionGate) -> bool {
        match self.executors.get(app_id) {
            Some(executor) if executor.is_external() => {
                self.executors.remove(app_id);
                permissions.revoke_all(app_id);
                info!(app_id = %app_id, "unregistered external app");
                true
            }
            Some(_) => {
                warn!(app_id = %app_id, "refusing to unregister a loaded package");
                false
            }
            None => {
                debug!(app_id = %app_id, "unregister for unknown app");
                false
            }
        }
    }
}

/// Package subdirectories of `dir`, sorted by file name.
async fn list_packages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut packages = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        // Follows symlinks, so linked package directories are picked up.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => packages.push(path),
            Ok(_) => debug!(path = %path.display(), "not a package directory, skipping"),
            Err(e) => debug!(path = %path.display(), error = %e, "unreadable entry, skipping"),
        }
    }

    packages.sort();
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use vui_core::{ACCESS_MULTIMEDIA, ACCESS_TTS};

    fn make_package(root: &Path, name: &str, descriptor: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), descriptor).unwrap();
        dir
    }

    fn skills_descriptor(skills: &[&str], permissions: &[&str]) -> String {
        serde_json::json!({
            "metadata": { "skills": skills, "permission": permissions }
        })
        .to_string()
    }

    #[tokio::test]
    async fn loads_packages_and_grants_permissions() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "weather", &skills_descriptor(&["weather", "forecast"], &[ACCESS_TTS]));
        make_package(tmp.path(), "alarm", &skills_descriptor(&["alarm"], &[]));

        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        let report = registry
            .load_all(&[tmp.path().to_path_buf()], &mut gate)
            .await
            .unwrap();

        assert_eq!(report.loaded.len(), 2);
        assert!(report.skipped.is_empty());
        assert_eq!(registry.len(), 3);
        assert!(gate.check(&AppId::from("forecast"), ACCESS_TTS));
        assert!(!gate.check(&AppId::from("alarm"), ACCESS_TTS));

        // Both skills share one executor.
        let weather = registry.get(&AppId::from("weather")).unwrap();
        let forecast = registry.get(&AppId::from("forecast")).unwrap();
        assert!(Arc::ptr_eq(&weather, &forecast));
        assert_eq!(weather.skills.len(), 2);
    }

    #[tokio::test]
    async fn loads_in_file_name_order() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "b-pkg", &skills_descriptor(&["b"], &[]));
        make_package(tmp.path(), "a-pkg", &skills_descriptor(&["a"], &[]));
        make_package(tmp.path(), "c-pkg", &skills_descriptor(&["c"], &[]));

        let mut registry = ExecutorRegistry::new();
        let report = registry
            .load_all(&[tmp.path().to_path_buf()], &mut PermissionGate::new())
            .await
            .unwrap();

        let names: Vec<_> = report
            .loaded
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a-pkg", "b-pkg", "c-pkg"]);
    }

    #[tokio::test]
    async fn conflict_aborts_before_registering_later_skills() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "a-weather", &skills_descriptor(&["weather"], &[]));
        make_package(tmp.path(), "b-weather", &skills_descriptor(&["news", "weather"], &[ACCESS_TTS]));
        make_package(tmp.path(), "c-later", &skills_descriptor(&["later"], &[]));

        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        let err = registry
            .load_all(&[tmp.path().to_path_buf()], &mut gate)
            .await
            .unwrap_err();

        let LoadError::Conflict { skill, package } = err;
        assert_eq!(skill, "weather");
        assert!(package.ends_with("b-weather"));

        assert!(registry.contains(&AppId::from("weather")));
        assert!(!registry.contains(&AppId::from("news")));
        assert!(!registry.contains(&AppId::from("later")));
        assert!(!gate.check(&AppId::from("news"), ACCESS_TTS));
    }

    #[tokio::test]
    async fn skill_repeated_within_package_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "a-news", &skills_descriptor(&["news"], &[]));
        make_package(tmp.path(), "b-weather", &skills_descriptor(&["weather", "weather"], &[ACCESS_TTS]));

        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        let err = registry
            .load_all(&[tmp.path().to_path_buf()], &mut gate)
            .await
            .unwrap_err();

        let LoadError::Conflict { skill, package } = err;
        assert_eq!(skill, "weather");
        assert!(package.ends_with("b-weather"));
        assert!(registry.contains(&AppId::from("news")));
        assert!(!registry.contains(&AppId::from("weather")));
        assert!(!gate.check(&AppId::from("weather"), ACCESS_TTS));
    }

    #[tokio::test]
    async fn conflict_across_directories_keeps_first_writer() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let original = make_package(first.path(), "pkg", &skills_descriptor(&["weather"], &[]));
        make_package(second.path(), "pkg", &skills_descriptor(&["weather"], &[]));

        let mut registry = ExecutorRegistry::new();
        let result = registry
            .load_all(
                &[first.path().to_path_buf(), second.path().to_path_buf()],
                &mut PermissionGate::new(),
            )
            .await;

        assert!(result.is_err());
        let executor = registry.get(&AppId::from("weather")).unwrap();
        assert_eq!(executor.origin, ExecutorOrigin::Local(original));
    }

    #[tokio::test]
    async fn skips_unreadable_and_malformed_descriptors() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "broken", "{ not json");
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        fs::write(tmp.path().join("stray-file"), "ignored").unwrap();
        make_package(tmp.path(), "good", &skills_descriptor(&["good"], &[]));

        let mut registry = ExecutorRegistry::new();
        let report = registry
            .load_all(&[tmp.path().to_path_buf()], &mut PermissionGate::new())
            .await
            .unwrap();

        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::DescriptorUnreadable(_))));
        assert!(registry.contains(&AppId::from("good")));
    }

    #[tokio::test]
    async fn skips_package_with_missing_entry() {
        let tmp = TempDir::new().unwrap();
        make_package(
            tmp.path(),
            "no-entry",
            r#"{"main": "app.js", "metadata": {"skills": ["ghost"]}}"#,
        );
        let with_entry = make_package(
            tmp.path(),
            "with-entry",
            r#"{"main": "app.js", "metadata": {"skills": ["real"]}}"#,
        );
        fs::write(with_entry.join("app.js"), "").unwrap();

        let mut registry = ExecutorRegistry::new();
        let report = registry
            .load_all(&[tmp.path().to_path_buf()], &mut PermissionGate::new())
            .await
            .unwrap();

        assert!(!registry.contains(&AppId::from("ghost")));
        assert!(registry.contains(&AppId::from("real")));
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::InvalidExecutor(ref msg) if msg.contains("app.js")
        ));
    }

    #[tokio::test]
    async fn skips_missing_directory() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "pkg", &skills_descriptor(&["only"], &[]));

        let mut registry = ExecutorRegistry::new();
        let report = registry
            .load_all(
                &[tmp.path().join("missing"), tmp.path().to_path_buf()],
                &mut PermissionGate::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.loaded.len(), 1);
        assert!(registry.contains(&AppId::from("only")));
    }

    #[test]
    fn register_external_grants_defaults() {
        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        let id = AppId::from("remote");
        let defaults = vec![ACCESS_TTS.to_string(), ACCESS_MULTIMEDIA.to_string()];

        registry.register_external(
            &id,
            ConnectionDescriptor::new("/remote", "com.example.remote"),
            &mut gate,
            &defaults,
        );

        let executor = registry.get(&id).unwrap();
        assert!(executor.is_external());
        assert!(executor.valid);
        assert_eq!(executor.skills, vec![id.clone()]);
        assert_eq!(executor.connection().unwrap().object_path, "/remote");
        assert!(gate.check(&id, ACCESS_TTS));
        assert!(gate.check(&id, ACCESS_MULTIMEDIA));
    }

    #[test]
    fn unregister_removes_only_external() {
        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        let id = AppId::from("remote");
        registry.register_external(
            &id,
            ConnectionDescriptor::new("/remote", "com.example.remote"),
            &mut gate,
            &[ACCESS_TTS.to_string()],
        );

        assert!(registry.unregister_external(&id, &mut gate));
        assert!(!registry.contains(&id));
        assert!(!gate.contains(&id));
        assert!(!registry.unregister_external(&id, &mut gate));
    }

    #[tokio::test]
    async fn unregister_refuses_loaded_package() {
        let tmp = TempDir::new().unwrap();
        make_package(tmp.path(), "pkg", &skills_descriptor(&["local"], &[ACCESS_TTS]));
        let mut registry = ExecutorRegistry::new();
        let mut gate = PermissionGate::new();
        registry
            .load_all(&[tmp.path().to_path_buf()], &mut gate)
            .await
            .unwrap();

        let id = AppId::from("local");
        assert!(!registry.unregister_external(&id, &mut gate));
        assert!(registry.contains(&id));
        assert!(gate.check(&id, ACCESS_TTS));
    }
}
