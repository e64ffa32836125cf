//! In-memory index of declared plugins and their runtime records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vpm_core::{PluginSpec, ResolvedPlugin, Result, VpmError};

/// Maps plugin names and aliases to their specs and runtime records.
///
/// Records are created the first time a plugin is addressed. Concurrent
/// workers each mutate only their own record, so one map-level lock covers
/// insertion and lookup.
#[derive(Debug)]
pub struct Registry {
    /// Specs in declaration order.
    specs: Vec<Arc<PluginSpec>>,

    /// Name and alias to index into `specs`.
    keys: HashMap<String, usize>,

    /// Runtime records keyed by plugin name.
    entries: Mutex<HashMap<String, ResolvedPlugin>>,
}

impl Registry {
    /// Creates a registry, rejecting names or aliases that collide.
    pub fn new(specs: impl IntoIterator<Item = PluginSpec>) -> Result<Self> {
        let specs: Vec<Arc<PluginSpec>> = specs.into_iter().map(Arc::new).collect();
        let mut keys = HashMap::new();

        for (index, spec) in specs.iter().enumerate() {
            let alias = spec.alias.as_deref().filter(|a| *a != spec.name);

            for key in std::iter::once(spec.name.as_str()).chain(alias) {
                if let Some(first) = keys.insert(key.to_string(), index) {
                    return Err(VpmError::DuplicatePlugin {
                        key: key.to_string(),
                        first: specs[first].name.clone(),
                        second: spec.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            specs,
            keys,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the number of declared plugins.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Looks up a spec by name or alias.
    pub fn lookup(&self, key: &str) -> Option<&Arc<PluginSpec>> {
        self.keys.get(key).map(|&index| &self.specs[index])
    }

    /// Selects the specs addressed by `names`.
    ///
    /// An empty filter selects every plugin. Otherwise each name must match a
    /// plugin name or alias; all unmatched names are reported together.
    /// Results are in declaration order with duplicates collapsed.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<PluginSpec>>> {
        if names.is_empty() {
            return Ok(self.specs.clone());
        }

        let mut selected = vec![false; self.specs.len()];
        let mut unknown = Vec::new();

        for name in names {
            match self.keys.get(name.as_str()) {
                Some(&index) => selected[index] = true,
                None if !unknown.contains(name) => unknown.push(name.clone()),
                None => {}
            }
        }

        if !unknown.is_empty() {
            return Err(VpmError::UnknownPlugins(unknown));
        }

        Ok(self
            .specs
            .iter()
            .zip(selected)
            .filter_map(|(spec, keep)| keep.then(|| spec.clone()))
            .collect())
    }

    /// Selects plugins by name or alias and returns their current records.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<ResolvedPlugin>> {
        let specs = self.select(names)?;
        Ok(specs.iter().map(|spec| self.touch(spec, |_| {})).collect())
    }

    /// Returns the record for `spec`, creating it on first touch.
    ///
    /// `seed` runs only when the record is created.
    pub fn touch(
        &self,
        spec: &Arc<PluginSpec>,
        seed: impl FnOnce(&mut ResolvedPlugin),
    ) -> ResolvedPlugin {
        self.lock()
            .entry(spec.name.clone())
            .or_insert_with(|| {
                let mut plugin = ResolvedPlugin::new(spec.clone());
                seed(&mut plugin);
                plugin
            })
            .clone()
    }

    /// Applies `f` to a plugin's record, creating it on first touch.
    pub fn update<R>(
        &self,
        spec: &Arc<PluginSpec>,
        f: impl FnOnce(&mut ResolvedPlugin) -> R,
    ) -> R {
        let mut entries = self.lock();
        let plugin = entries
            .entry(spec.name.clone())
            .or_insert_with(|| ResolvedPlugin::new(spec.clone()));
        f(plugin)
    }

    /// Returns a snapshot of a plugin's record.
    pub fn get(&self, key: &str) -> Option<ResolvedPlugin> {
        let spec = self.lookup(key)?;
        self.lock().get(&spec.name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ResolvedPlugin>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpm_core::{PipelineState, Source};

    fn registry() -> Registry {
        Registry::new(vec![
            PluginSpec::new("auth", Source::Remote("u/auth".into())).with_alias("a"),
            PluginSpec::new("cache", Source::Remote("u/cache".into())),
            PluginSpec::new("metrics", Source::Remote("u/metrics".into())).with_alias("m"),
        ])
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_selects_all() {
        let registry = registry();
        let resolved = registry.resolve(&[]).unwrap();

        assert_eq!(resolved.len(), registry.len());
        let order: Vec<_> = resolved.iter().map(|p| p.name()).collect();
        assert_eq!(order, vec!["auth", "cache", "metrics"]);
    }

    #[test]
    fn test_alias_selects_plugin() {
        let registry = registry();
        let resolved = registry.resolve(&names(&["a"])).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name(), "auth");
    }

    #[test]
    fn test_selection_in_declaration_order_without_duplicates() {
        let registry = registry();
        let selected = registry
            .select(&names(&["m", "auth", "a", "metrics"]))
            .unwrap();

        let order: Vec<_> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(order, vec!["auth", "metrics"]);
    }

    #[test]
    fn test_unknown_names_fail_together() {
        let registry = registry();
        let err = registry
            .resolve(&names(&["cache", "nonexistent", "au", "nonexistent"]))
            .unwrap_err();

        match err {
            VpmError::UnknownPlugins(unknown) => {
                assert_eq!(unknown, names(&["nonexistent", "au"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = Registry::new(vec![
            PluginSpec::new("auth", Source::Remote("u".into())).with_alias("x"),
            PluginSpec::new("cache", Source::Remote("u".into())).with_alias("x"),
        ])
        .unwrap_err();

        assert!(matches!(err, VpmError::DuplicatePlugin { ref key, .. } if key == "x"));
    }

    #[test]
    fn test_touch_seeds_once_and_update_mutates() {
        let registry = registry();
        let spec = registry.lookup("cache").unwrap().clone();

        registry.touch(&spec, |p| p.resolved_ref = Some("abc".to_string()));
        registry.touch(&spec, |p| p.resolved_ref = Some("ignored".to_string()));
        registry.update(&spec, |p| p.state = PipelineState::Building);

        let record = registry.get("cache").unwrap();
        assert_eq!(record.resolved_ref.as_deref(), Some("abc"));
        assert_eq!(record.state, PipelineState::Building);
        assert!(registry.get("auth").is_none());
    }

    #[test]
    fn test_update_creates_record() {
        let registry = registry();
        let spec = registry.lookup("m").unwrap().clone();

        let name = registry.update(&spec, |p| p.name().to_string());
        assert_eq!(name, "metrics");
        assert!(registry.get("metrics").is_some());
    }
}
