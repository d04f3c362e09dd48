//! Lookup of crawl targets by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::Target;

/// Targets keyed by normalized name. Built once at startup, then shared
/// read-only behind an `Arc`.
#[derive(Default)]
pub struct TargetRegistry {
    targets: HashMap<String, Arc<dyn Target>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under its normalized name, replacing any previous
    /// registration.
    pub fn register(&mut self, target: Arc<dyn Target>) {
        let key = normalize(target.name());
        if self.targets.insert(key.clone(), target).is_some() {
            warn!(target_name = %key, "replacing previously registered target");
        }
    }

    /// Find a target by name; resolution ignores case and surrounding
    /// whitespace.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Target>> {
        self.targets.get(&normalize(name)).cloned()
    }

    /// Registered names, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.targets.keys().cloned().collect();
        names.sort();
        names
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
