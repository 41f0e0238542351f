//! Plugin registry
//!
//! Holds the plug-ins registered in memory and the directories to scan,
//! both keyed by capability name. The registry is a cheap cloneable handle:
//! create it once at startup and pass it to everything that discovers
//! plug-ins.

use crate::capability::{Capability, PluginDescriptor};
use crate::discovery::{self, PluginScanner};
use crate::error::{Error, Result};
use crate::loader::LoaderError;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Environment variable consulted when no root is registered
pub const PROJECTS_ENV: &str = "AVALON_PROJECTS";

/// Handle to the process-wide plug-in registry
#[derive(Clone)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    scanner: Arc<PluginScanner>,
}

#[derive(Default)]
struct RegistryInner {
    /// `Arc<C::Class>` values, boxed, by capability name
    plugins: HashMap<&'static str, Vec<Box<dyn Any + Send + Sync>>>,
    /// Normalized directories by capability name, in registration order
    paths: HashMap<&'static str, Vec<PathBuf>>,
    root: Option<PathBuf>,
}

impl PluginRegistry {
    /// Create an empty registry with the default loaders
    pub fn new() -> std::result::Result<Self, LoaderError> {
        Ok(Self::with_scanner(PluginScanner::new()?))
    }

    /// Create with an existing scanner
    pub fn with_scanner(scanner: PluginScanner) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            scanner: Arc::new(scanner),
        }
    }

    /// Scanner used for registered directories
    pub fn scanner(&self) -> &PluginScanner {
        &self.scanner
    }

    /// Register a plug-in for `C`; registering the same `Arc` again does nothing
    pub fn register_plugin<C: Capability>(&self, plugin: Arc<C::Class>) {
        let mut inner = self.inner.write();
        let registered = inner.plugins.entry(C::NAME).or_default();

        let present = registered
            .iter()
            .filter_map(|p| p.downcast_ref::<Arc<C::Class>>())
            .any(|p| Arc::ptr_eq(p, &plugin));

        if !present {
            tracing::debug!(capability = C::NAME, plugin = %plugin.name(), "Registered plug-in");
            registered.push(Box::new(plugin));
        }
    }

    /// Remove a plug-in registered with [`register_plugin`](Self::register_plugin)
    pub fn deregister_plugin<C: Capability>(&self, plugin: &Arc<C::Class>) -> Result<()> {
        let mut inner = self.inner.write();
        let registered = inner.plugins.get_mut(C::NAME);

        let position = registered.as_ref().and_then(|registered| {
            registered.iter().position(|p| {
                p.downcast_ref::<Arc<C::Class>>()
                    .map(|p| Arc::ptr_eq(p, plugin))
                    .unwrap_or(false)
            })
        });

        match (registered, position) {
            (Some(registered), Some(index)) => {
                registered.remove(index);
                Ok(())
            }
            _ => Err(Error::not_registered(C::NAME, plugin.name())),
        }
    }

    /// Plug-ins registered in memory for `C`, in registration order
    pub fn registered_plugins<C: Capability>(&self) -> Vec<Arc<C::Class>> {
        let inner = self.inner.read();
        inner
            .plugins
            .get(C::NAME)
            .map(|registered| {
                registered
                    .iter()
                    .filter_map(|p| p.downcast_ref::<Arc<C::Class>>())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Register a directory to scan for `C`; returns the normalized path
    pub fn register_plugin_path<C: Capability>(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = normalize_path(path.as_ref())?;
        let mut inner = self.inner.write();
        let paths = inner.paths.entry(C::NAME).or_default();

        if !paths.contains(&path) {
            tracing::debug!(
                capability = C::NAME,
                path = %path.display(),
                "Registered plug-in path"
            );
            paths.push(path.clone());
        }

        Ok(path)
    }

    /// Remove a directory registered with [`register_plugin_path`](Self::register_plugin_path)
    pub fn deregister_plugin_path<C: Capability>(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = normalize_path(path.as_ref())?;
        let mut inner = self.inner.write();
        let paths = inner.paths.get_mut(C::NAME);
        let position = paths
            .as_ref()
            .and_then(|paths| paths.iter().position(|p| p == &path));

        match (paths, position) {
            (Some(paths), Some(index)) => {
                paths.remove(index);
                Ok(())
            }
            _ => Err(Error::not_registered(C::NAME, path.display().to_string())),
        }
    }

    /// Directories registered for `C`, in registration order
    pub fn plugin_paths<C: Capability>(&self) -> Vec<PathBuf> {
        self.inner
            .read()
            .paths
            .get(C::NAME)
            .cloned()
            .unwrap_or_default()
    }

    /// Every registered directory by capability name
    ///
    /// The returned map is a copy; changing it does not touch the registry.
    pub fn registered_plugin_paths(&self) -> BTreeMap<String, Vec<PathBuf>> {
        self.inner
            .read()
            .paths
            .iter()
            .map(|(capability, paths)| (capability.to_string(), paths.clone()))
            .collect()
    }

    /// Find every plug-in implementing `C`, sorted by name
    pub fn discover<C: Capability>(&self) -> Result<Vec<Arc<C::Class>>> {
        discovery::discover::<C>(self)
    }

    /// Register the currently active project root
    pub fn register_root(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::info!(root = %path.display(), "Registering root");
        self.inner.write().root = Some(path);
    }

    /// Currently active project root
    ///
    /// Falls back to `AVALON_PROJECTS`, then to an empty path.
    pub fn registered_root(&self) -> PathBuf {
        let root = self
            .inner
            .read()
            .root
            .clone()
            .or_else(|| std::env::var_os(PROJECTS_ENV).map(PathBuf::from))
            .unwrap_or_default();
        lexical_normalize(&root)
    }
}

/// Make `path` absolute and fold `.`/`..` without touching the filesystem
pub fn normalize_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(lexical_normalize(&absolute))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if !at_root {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadedUnit, LoaderSet};
    use jiminy_plugin_api::ClassSpec;

    struct Validator;

    struct NamedValidator(&'static str);

    impl PluginDescriptor for NamedValidator {
        fn name(&self) -> &str {
            self.0
        }
    }

    impl Capability for Validator {
        const NAME: &'static str = "Validator";
        type Class = dyn PluginDescriptor;

        fn from_spec(spec: &ClassSpec, _unit: &LoadedUnit) -> anyhow::Result<Arc<Self::Class>> {
            anyhow::bail!("{} is declarative only", spec.name)
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::with_scanner(PluginScanner::with_loaders(LoaderSet::empty()))
    }

    #[test]
    fn test_register_plugin_is_idempotent() {
        let registry = registry();
        let plugin: Arc<dyn PluginDescriptor> = Arc::new(NamedValidator("ValidateMesh"));

        registry.register_plugin::<Validator>(plugin.clone());
        registry.register_plugin::<Validator>(plugin.clone());
        assert_eq!(registry.registered_plugins::<Validator>().len(), 1);

        // Same name, different object: both kept
        registry.register_plugin::<Validator>(Arc::new(NamedValidator("ValidateMesh")));
        assert_eq!(registry.registered_plugins::<Validator>().len(), 2);
    }

    #[test]
    fn test_deregister_unknown_plugin_fails() {
        let registry = registry();
        let plugin: Arc<dyn PluginDescriptor> = Arc::new(NamedValidator("ValidateMesh"));

        let err = registry.deregister_plugin::<Validator>(&plugin).unwrap_err();
        assert!(matches!(err, Error::NotRegistered { .. }));

        registry.register_plugin::<Validator>(plugin.clone());
        registry.deregister_plugin::<Validator>(&plugin).unwrap();
        assert!(registry.registered_plugins::<Validator>().is_empty());
        assert!(registry.deregister_plugin::<Validator>(&plugin).is_err());
    }

    #[test]
    fn test_register_plugin_path_normalizes_and_dedupes() {
        let registry = registry();

        let first = registry
            .register_plugin_path::<Validator>("/studio/plugins/validate")
            .unwrap();
        let second = registry
            .register_plugin_path::<Validator>("/studio/./plugins/extra/../validate")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            registry.plugin_paths::<Validator>(),
            vec![PathBuf::from("/studio/plugins/validate")]
        );
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let registry = registry();
        let path = registry
            .register_plugin_path::<Validator>("plugins")
            .unwrap();

        assert!(path.is_absolute());
        assert!(path.ends_with("plugins"));
    }

    #[test]
    fn test_deregister_plugin_path() {
        let registry = registry();
        registry
            .register_plugin_path::<Validator>("/studio/plugins")
            .unwrap();

        registry
            .deregister_plugin_path::<Validator>("/studio/plugins/")
            .unwrap();
        assert!(registry.plugin_paths::<Validator>().is_empty());

        assert!(matches!(
            registry.deregister_plugin_path::<Validator>("/studio/plugins"),
            Err(Error::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_registered_plugin_paths_is_a_copy() {
        let registry = registry();
        registry
            .register_plugin_path::<Validator>("/studio/plugins")
            .unwrap();

        let mut copy = registry.registered_plugin_paths();
        copy.get_mut("Validator").unwrap().push(PathBuf::from("/tmp"));
        copy.insert("Creator".into(), vec![]);

        let fresh = registry.registered_plugin_paths();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh["Validator"], vec![PathBuf::from("/studio/plugins")]);
    }

    #[test]
    fn test_failed_deregistration_leaves_no_entry() {
        let registry = registry();
        let plugin: Arc<dyn PluginDescriptor> = Arc::new(NamedValidator("ValidateMesh"));

        assert!(registry.deregister_plugin::<Validator>(&plugin).is_err());
        assert!(registry
            .deregister_plugin_path::<Validator>("/studio/plugins")
            .is_err());

        assert!(registry.registered_plugin_paths().is_empty());
        assert!(registry.registered_plugins::<Validator>().is_empty());
    }

    #[test]
    fn test_registered_root() {
        let registry = registry();
        registry.register_root("/projects/./hero");
        assert_eq!(registry.registered_root(), PathBuf::from("/projects/hero"));
    }

    #[test]
    fn test_lexical_normalize_stops_at_root() {
        assert_eq!(
            lexical_normalize(Path::new("/../a/./b/..")),
            PathBuf::from("/a")
        );
    }
}
