//! Studio settings file
//!
//! Each repository on `JIMINY_SETTINGS_PATH` may carry a
//! `jiminy-settings.toml`; the last one found wins.
//!
//! ```toml
//! [dress]
//! name = "studio"
//! path = "/studio/dress"
//!
//! [project]
//! root = "/projects"
//!
//! [plugins]
//! creator = ["plugins/create"]
//! loader = ["plugins/load"]
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Relative plug-in directories resolve against `dress.path`, or against the
//! settings file's directory when no dress path is given.

use crate::capability::Capability;
use crate::creator::Creator;
use crate::error::{ConfigError, Result};
use crate::load::Loader;
use crate::registry::PluginRegistry;
use crate::tracing_support::{TracingConfig, TracingFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name looked up in every settings directory
pub const SETTINGS_FILE: &str = "jiminy-settings.toml";

/// Search path for [`SETTINGS_FILE`]
pub const SETTINGS_PATH_ENV: &str = "JIMINY_SETTINGS_PATH";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub dress: DressSettings,
    pub project: ProjectSettings,
    pub plugins: PluginSettings,
    pub logging: LoggingSettings,

    /// Directory of the file these settings came from
    #[serde(skip)]
    pub origin: Option<PathBuf>,
}

/// Studio configuration to load on install
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DressSettings {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}

/// Where projects live
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub root: Option<PathBuf>,
}

/// Plug-in directories by capability
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub creator: Vec<PathBuf>,
    pub loader: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<TracingFormat>,
}

impl Settings {
    /// Parse settings text; `path` is only used for error messages
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut settings: Settings =
            toml::from_str(text).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.origin = path.parent().map(Path::to_path_buf);
        Ok(settings)
    }

    /// Read and parse a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Last settings file found in `dirs`
    pub fn find_in<I, P>(dirs: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        dirs.into_iter()
            .map(|dir| dir.as_ref().join(SETTINGS_FILE))
            .filter(|candidate| candidate.is_file())
            .last()
    }

    /// Last settings file found on `JIMINY_SETTINGS_PATH`
    pub fn find() -> Option<PathBuf> {
        let search = std::env::var_os(SETTINGS_PATH_ENV)?;
        Self::find_in(std::env::split_paths(&search))
    }

    /// Load the settings found on `JIMINY_SETTINGS_PATH`, if any
    pub fn discover() -> Result<Option<Self>> {
        match Self::find() {
            Some(path) => {
                tracing::info!(path = %path.display(), "Reading settings");
                Self::load(path).map(Some)
            }
            None => {
                tracing::debug!(env = SETTINGS_PATH_ENV, "No settings file found");
                Ok(None)
            }
        }
    }

    /// Creator directories, resolved to absolute paths where possible
    pub fn creator_paths(&self) -> Vec<PathBuf> {
        self.resolve(&self.plugins.creator)
    }

    /// Loader directories, resolved like [`creator_paths`](Self::creator_paths)
    pub fn loader_paths(&self) -> Vec<PathBuf> {
        self.resolve(&self.plugins.loader)
    }

    fn resolve(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let base = self.dress.path.as_ref().or(self.origin.as_ref());
        paths
            .iter()
            .map(|path| match base {
                Some(base) if path.is_relative() => base.join(path),
                _ => path.clone(),
            })
            .collect()
    }

    /// Register the configured plug-in directories and project root on
    /// `registry`
    pub fn apply(&self, registry: &PluginRegistry) -> Result<()> {
        register_paths::<Creator>(registry, self.creator_paths())?;
        register_paths::<Loader>(registry, self.loader_paths())?;
        if let Some(root) = &self.project.root {
            registry.register_root(root.clone());
        }
        Ok(())
    }

    /// Logging setup requested by these settings
    pub fn tracing_config(&self) -> TracingConfig {
        let level = self.logging.level.as_deref().and_then(|level| {
            level
                .parse::<tracing::Level>()
                .map_err(|_| tracing::warn!(level, "Ignoring unknown log level"))
                .ok()
        });

        TracingConfig {
            level,
            format: self.logging.format.unwrap_or_default(),
            ..Default::default()
        }
    }
}

fn register_paths<C: Capability>(registry: &PluginRegistry, paths: Vec<PathBuf>) -> Result<()> {
    for path in paths {
        registry.register_plugin_path::<C>(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PluginScanner;
    use crate::loader::LoaderSet;
    use std::fs;
    use tempfile::TempDir;

    const SETTINGS: &str = r#"
        [dress]
        name = "studio"

        [project]
        root = "/projects"

        [plugins]
        creator = ["plugins/create", "/shared/create"]
        loader = ["plugins/load"]

        [logging]
        level = "debug"
        format = "json"
    "#;

    #[test]
    fn test_parse_sections() {
        let settings = Settings::parse(SETTINGS, Path::new("/repo/jiminy-settings.toml")).unwrap();

        assert_eq!(settings.dress.name.as_deref(), Some("studio"));
        assert_eq!(settings.origin.as_deref(), Some(Path::new("/repo")));
        assert_eq!(
            settings.creator_paths(),
            vec![
                PathBuf::from("/repo/plugins/create"),
                PathBuf::from("/shared/create")
            ]
        );

        let tracing = settings.tracing_config();
        assert_eq!(tracing.level, Some(tracing::Level::DEBUG));
        assert_eq!(tracing.format, TracingFormat::Json);
    }

    #[test]
    fn test_dress_path_is_the_plugin_base() {
        let settings = Settings::parse(
            "[dress]\npath = \"/dress\"\n[plugins]\ncreator = [\"create\"]",
            Path::new("/repo/jiminy-settings.toml"),
        )
        .unwrap();

        assert_eq!(settings.creator_paths(), vec![PathBuf::from("/dress/create")]);
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let err = Settings::parse("[dress\n", Path::new("/repo/jiminy-settings.toml")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("/repo/jiminy-settings.toml"));

        assert!(Settings::parse("[unknown]\n", Path::new("s.toml")).is_err());
    }

    #[test]
    fn test_last_settings_file_wins() {
        let first = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let last = TempDir::new().unwrap();
        fs::write(first.path().join(SETTINGS_FILE), "").unwrap();
        fs::write(last.path().join(SETTINGS_FILE), "").unwrap();

        let found = Settings::find_in([first.path(), last.path(), empty.path()]).unwrap();
        assert_eq!(found, last.path().join(SETTINGS_FILE));

        assert!(Settings::find_in([empty.path()]).is_none());
    }

    #[test]
    fn test_apply_registers_paths_and_root() {
        let settings = Settings::parse(SETTINGS, Path::new("/repo/jiminy-settings.toml")).unwrap();
        let registry =
            PluginRegistry::with_scanner(PluginScanner::with_loaders(LoaderSet::empty()));

        settings.apply(&registry).unwrap();
        settings.apply(&registry).unwrap();

        assert_eq!(
            registry.plugin_paths::<Creator>(),
            vec![
                PathBuf::from("/repo/plugins/create"),
                PathBuf::from("/shared/create")
            ]
        );
        assert_eq!(
            registry.plugin_paths::<Loader>(),
            vec![PathBuf::from("/repo/plugins/load")]
        );
        assert_eq!(registry.registered_root(), PathBuf::from("/projects"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load("/nonexistent/jiminy-settings.toml").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Configuration(ConfigError::SettingsRead { .. })
        ));
    }
}
