//! Plug-in unit loaders
//!
//! A unit is one file in a plug-in directory. A [`UnitLoader`] turns the
//! file into a [`LoadedUnit`]: the classes it declares plus, for executable
//! units, an entry point the host calls back into.

mod manifest;
mod wasm;

pub use manifest::ManifestLoader;
pub use wasm::{WasmLoader, WasmUnit};

use jiminy_plugin_api::{ClassSpec, InstancePlan, ProcessRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading or calling into a unit
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("Engine creation failed: {0}")]
    EngineCreation(#[source] anyhow::Error),

    #[error("Module compilation failed: {0}")]
    ModuleCompilation(#[source] anyhow::Error),

    #[error("Instantiation failed: {0}")]
    Instantiation(#[source] anyhow::Error),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Function call failed: {function} - {source}")]
    FunctionCall {
        function: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("API version mismatch: expected {expected}, got {actual}")]
    ApiVersionMismatch { expected: u32, actual: u32 },

    #[error("Serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    #[error("Deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    #[error("Memory access error: {0}")]
    MemoryAccess(String),

    #[error("Fuel exhausted (CPU limit exceeded)")]
    FuelExhausted,

    #[error("Unit has no entry point for class {0}")]
    NoEntry(String),

    #[error("Loader panicked: {0}")]
    Panicked(String),
}

/// Turns files with a given extension into units
pub trait UnitLoader: Send + Sync {
    /// File extension handled, without the dot
    fn extension(&self) -> &str;

    /// Load the file at `path`
    fn load(&self, path: &Path) -> Result<LoadedUnit, LoaderError>;
}

/// Callback into an executable unit
pub trait UnitEntry: Send + Sync {
    /// Plan the instance for `request.class`
    fn process(&self, request: &ProcessRequest) -> anyhow::Result<InstancePlan>;
}

/// A successfully loaded unit
#[derive(Clone)]
pub struct LoadedUnit {
    /// Unit name, the file stem
    pub name: String,

    /// File the unit came from
    pub path: PathBuf,

    /// Classes declared at the top level of the unit
    pub classes: Vec<ClassSpec>,

    /// Entry point for executable units
    pub entry: Option<Arc<dyn UnitEntry>>,
}

impl LoadedUnit {
    /// Create a declaration-only unit
    pub fn new(path: impl Into<PathBuf>, classes: Vec<ClassSpec>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            classes,
            entry: None,
        }
    }

    /// Attach an entry point
    pub fn with_entry(mut self, entry: Arc<dyn UnitEntry>) -> Self {
        self.entry = Some(entry);
        self
    }
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("classes", &self.classes)
            .field("executable", &self.entry.is_some())
            .finish()
    }
}

/// Loaders known to a scanner, looked up by extension
pub struct LoaderSet {
    loaders: Vec<Box<dyn UnitLoader>>,
}

impl LoaderSet {
    /// An empty set; nothing will be loaded
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Manifest and Wasm loaders
    pub fn with_defaults() -> Result<Self, LoaderError> {
        Ok(Self::empty()
            .with(ManifestLoader)
            .with(WasmLoader::new()?))
    }

    /// Add a loader; a later loader for the same extension wins
    pub fn with(mut self, loader: impl UnitLoader + 'static) -> Self {
        self.loaders
            .retain(|existing| existing.extension() != loader.extension());
        self.loaders.push(Box::new(loader));
        self
    }

    /// Loader responsible for `path`, if any
    pub fn for_path(&self, path: &Path) -> Option<&dyn UnitLoader> {
        let ext = path.extension()?.to_str()?;
        self.loaders
            .iter()
            .find(|loader| loader.extension() == ext)
            .map(|loader| loader.as_ref())
    }

    /// Extensions handled by this set
    pub fn extensions(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.extension()).collect()
    }
}
