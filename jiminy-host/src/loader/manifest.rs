//! Declarative units
//!
//! A `.toml` unit declares classes without code:
//!
//! ```toml
//! [[class]]
//! name = "BoxCreator"
//! bases = ["Creator"]
//! family = "box"
//! label = "Box"
//!
//! [class.data]
//! color = "red"
//! ```
//!
//! Instances of these classes are created with the host's default process.

use super::{LoadedUnit, LoaderError, UnitLoader};
use jiminy_plugin_api::{ModuleManifest, API_VERSION};
use std::path::Path;

/// Loader for `.toml` manifest units
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    /// Parse manifest text
    pub fn parse(text: &str) -> Result<ModuleManifest, LoaderError> {
        let manifest: ModuleManifest = toml::from_str(text).map_err(LoaderError::Parse)?;

        if manifest.api_version != API_VERSION {
            return Err(LoaderError::ApiVersionMismatch {
                expected: API_VERSION,
                actual: manifest.api_version,
            });
        }

        Ok(manifest)
    }
}

impl UnitLoader for ManifestLoader {
    fn extension(&self) -> &str {
        "toml"
    }

    fn load(&self, path: &Path) -> Result<LoadedUnit, LoaderError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::parse(&text)?;

        Ok(LoadedUnit::new(path, manifest.classes))
    }
}
