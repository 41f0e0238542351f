//! Plugin discovery and directory scanning
//!
//! Discovery merges the classes found in registered directories with the
//! plug-ins registered in memory. Only a registered path that is not a
//! directory stops discovery; a unit that fails to load is logged and
//! skipped.

use crate::capability::{classes_implementing, Capability, PluginDescriptor};
use crate::error::{ConfigError, Result};
use crate::guard::panic_message;
use crate::loader::{LoadedUnit, LoaderError, LoaderSet};
use crate::registry::PluginRegistry;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files starting with this are never loaded
pub const IGNORE_PREFIX: char = '_';

/// Result of scanning one directory
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Successfully loaded units, in file-name order
    pub units: Vec<LoadedUnit>,

    /// Units that failed to load
    pub failures: Vec<(PathBuf, LoaderError)>,
}

impl ScanResult {
    /// Returns true if every candidate loaded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of candidate files found
    pub fn total_found(&self) -> usize {
        self.units.len() + self.failures.len()
    }
}

/// Plugin directory scanner
pub struct PluginScanner {
    loaders: LoaderSet,
}

impl PluginScanner {
    /// Create a scanner with the default loaders
    pub fn new() -> std::result::Result<Self, LoaderError> {
        Ok(Self {
            loaders: LoaderSet::with_defaults()?,
        })
    }

    /// Create with an existing loader set
    pub fn with_loaders(loaders: LoaderSet) -> Self {
        Self { loaders }
    }

    /// Loaders used by this scanner
    pub fn loaders(&self) -> &LoaderSet {
        &self.loaders
    }

    /// Load every candidate unit in `dir` (non-recursive)
    pub fn scan_directory(&self, dir: impl AsRef<Path>) -> Result<ScanResult> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()).into());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.path()),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Unreadable directory entry");
                    None
                }
            })
            .collect();
        paths.sort();

        let mut result = ScanResult::default();
        for path in paths {
            if !self.is_candidate(&path) {
                continue;
            }
            match self.load_unit(&path) {
                Ok(unit) => result.units.push(unit),
                Err(e) => result.failures.push((path, e)),
            }
        }

        Ok(result)
    }

    fn is_candidate(&self, path: &Path) -> bool {
        let ignored = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(IGNORE_PREFIX))
            .unwrap_or(true);

        !ignored && path.is_file() && self.loaders.for_path(path).is_some()
    }

    fn load_unit(&self, path: &Path) -> std::result::Result<LoadedUnit, LoaderError> {
        let loader = self
            .loaders
            .for_path(path)
            .ok_or_else(|| LoaderError::NoEntry(path.display().to_string()))?;

        catch_unwind(AssertUnwindSafe(|| loader.load(path)))
            .unwrap_or_else(|payload| Err(LoaderError::Panicked(panic_message(payload))))
    }
}

/// Get default plugin directories for the current platform
pub fn default_plugin_dirs(app_name: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join(app_name).join("plugins"));
    }

    dirs.push(PathBuf::from("plugins"));

    dirs
}

/// Find every plug-in implementing `C`, sorted by name
///
/// Filesystem classes are collected first (first seen wins on duplicate
/// names), then explicitly registered plug-ins are applied on top and
/// replace filesystem ones of the same name.
pub fn discover<C: Capability>(registry: &PluginRegistry) -> Result<Vec<Arc<C::Class>>> {
    let mut plugins: BTreeMap<String, Arc<C::Class>> = BTreeMap::new();

    for path in registry.plugin_paths::<C>() {
        let scan = registry.scanner().scan_directory(&path)?;

        for (file, error) in &scan.failures {
            tracing::warn!(path = %file.display(), error = %error, "Skipped plug-in unit");
        }

        for unit in &scan.units {
            for spec in classes_implementing(&unit.classes, C::NAME) {
                if plugins.contains_key(&spec.name) {
                    tracing::warn!(
                        capability = C::NAME,
                        plugin = %spec.name,
                        unit = %unit.path.display(),
                        "Duplicate plug-in found"
                    );
                    continue;
                }

                match C::from_spec(&spec, unit) {
                    Ok(plugin) => {
                        tracing::debug!(
                            capability = C::NAME,
                            plugin = %spec.name,
                            unit = %unit.name,
                            "Discovered plug-in"
                        );
                        plugins.insert(spec.name.clone(), plugin);
                    }
                    Err(e) => {
                        tracing::warn!(
                            capability = C::NAME,
                            plugin = %spec.name,
                            unit = %unit.path.display(),
                            error = %e,
                            "Skipped plug-in class"
                        );
                    }
                }
            }
        }
    }

    for plugin in registry.registered_plugins::<C>() {
        let name = plugin.name().to_string();
        if plugins.contains_key(&name) {
            tracing::warn!(capability = C::NAME, plugin = %name, "Overwriting discovered plug-in");
        }
        plugins.insert(name, plugin);
    }

    Ok(plugins.into_values().collect())
}
