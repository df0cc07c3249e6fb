//! Startup-built table mapping protected operations to permission paths.

use std::collections::BTreeMap;

use crate::models::permission::PermissionDescriptor;
use crate::validation::rules::is_well_formed_permission_path;

#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    by_operation: BTreeMap<String, PermissionDescriptor>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `operation` as guarded by `path`. Operations and paths must be unique.
    pub fn register(&mut self, operation: &str, path: &str, title: &str) -> anyhow::Result<()> {
        if !is_well_formed_permission_path(path) {
            anyhow::bail!("malformed permission path {path:?} for operation {operation}");
        }
        if self.by_operation.contains_key(operation) {
            anyhow::bail!("operation {operation} registered twice");
        }
        if self.contains_path(path) {
            anyhow::bail!("permission path {path} registered twice");
        }

        self.by_operation.insert(
            operation.to_string(),
            PermissionDescriptor {
                operation: operation.to_string(),
                path: path.to_string(),
                title: title.to_string(),
            },
        );
        Ok(())
    }

    pub fn path_for(&self, operation: &str) -> Option<&str> {
        self.by_operation
            .get(operation)
            .map(|descriptor| descriptor.path.as_str())
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_operation
            .values()
            .any(|descriptor| descriptor.path == path)
    }

    /// Every descriptor, ordered by path.
    pub fn all(&self) -> Vec<PermissionDescriptor> {
        let mut descriptors: Vec<PermissionDescriptor> =
            self.by_operation.values().cloned().collect();
        descriptors.sort_by(|a, b| a.path.cmp(&b.path));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.by_operation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_operation.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_look_up() {
        let mut registry = PermissionRegistry::new();
        registry
            .register("users.lock", "/api/user/v1/lock", "Lock users")
            .unwrap();
        assert_eq!(registry.path_for("users.lock"), Some("/api/user/v1/lock"));
        assert!(registry.contains_path("/api/user/v1/lock"));
        assert!(!registry.contains_path(""));
        assert_eq!(registry.path_for("users.unknown"), None);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut registry = PermissionRegistry::new();
        registry.register("a", "/a", "A").unwrap();
        assert!(registry.register("a", "/b", "B").is_err());
        assert!(registry.register("b", "/a", "B").is_err());
        assert!(registry.register("c", "", "C").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn all_is_sorted_by_path() {
        let mut registry = PermissionRegistry::new();
        registry.register("z", "/z", "Z").unwrap();
        registry.register("a", "/m", "M").unwrap();
        let paths: Vec<String> = registry.all().into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["/m", "/z"]);
    }
}
