//! Loading published representations
//!
//! A loader brings one published representation back into the scene. It
//! declares the families and representations it accepts; the file it reads
//! is resolved from the project's publish template and the registered root.

use crate::capability::{Capability, PluginDescriptor};
use crate::error::Result;
use crate::loader::LoadedUnit;
use crate::publish::{format_publish_path, publish_repo, TemplateError, PUBLISH_TEMPLATE};
use crate::registry::PluginRegistry;
use crate::scene::SceneBackend;
use jiminy_plugin_api::{ClassSpec, DataMap};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The `Loader` capability
pub struct Loader;

impl Capability for Loader {
    const NAME: &'static str = "Loader";
    type Class = dyn LoaderPlugin;

    fn from_spec(spec: &ClassSpec, _unit: &LoadedUnit) -> anyhow::Result<Arc<Self::Class>> {
        Ok(Arc::new(DeclaredLoader::new(spec)))
    }
}

/// Where a representation was published
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadContext {
    /// Project publish template; [`PUBLISH_TEMPLATE`] when unset
    pub template: Option<String>,

    /// Silo the asset lives in (`assets`, `film`, ...)
    pub silo: String,

    /// Document names by kind: `project`, `asset`, `subset`, `version`,
    /// `representation`
    pub names: BTreeMap<String, String>,
}

impl LoadContext {
    pub fn new(silo: impl Into<String>) -> Self {
        Self {
            silo: silo.into(),
            ..Default::default()
        }
    }

    /// Set the name of one document kind
    pub fn name(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(kind.into(), name.into());
        self
    }

    /// Use a project-specific publish template
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Name of the document of `kind`, if known
    pub fn get(&self, kind: &str) -> Option<&str> {
        self.names.get(kind).map(String::as_str)
    }
}

/// A loader bound to one published file
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderInstance {
    /// Published file to read
    pub fname: PathBuf,
    pub context: LoadContext,
}

impl LoaderInstance {
    /// Resolve the published file of `context` under `root`
    ///
    /// The template sees every document name plus `root`, `silo` and
    /// `publish` (the publish repository under `root`).
    pub fn new(root: &Path, context: &LoadContext) -> std::result::Result<Self, TemplateError> {
        let root_text = root.to_string_lossy();
        let publish = publish_repo(root);
        let publish_text = publish.to_string_lossy();

        let mut fields: HashMap<&str, &str> = context
            .names
            .iter()
            .map(|(kind, name)| (kind.as_str(), name.as_str()))
            .collect();
        fields.insert("root", &root_text);
        fields.insert("silo", &context.silo);
        fields.insert("publish", &publish_text);

        let template = context.template.as_deref().unwrap_or(PUBLISH_TEMPLATE);
        let fname = format_publish_path(template, &fields)?;

        Ok(Self {
            fname: PathBuf::from(fname),
            context: context.clone(),
        })
    }
}

/// Arguments to [`LoaderPlugin::load`]
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// Pre-defined container name
    pub name: Option<String>,
    /// Pre-defined namespace
    pub namespace: Option<String>,
    pub data: Option<DataMap>,
}

/// Loads representations of some families into the scene
pub trait LoaderPlugin: PluginDescriptor {
    /// Families this loader accepts
    fn families(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Representations this loader reads
    fn representations(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Whether `representation` of `family` is handled here
    fn is_compatible(&self, family: &str, representation: &str) -> bool {
        self.families().iter().any(|f| *f == family)
            && self.representations().iter().any(|r| *r == representation)
    }

    /// Bind this loader to the file `context` was published to
    fn prepare(
        &self,
        registry: &PluginRegistry,
        context: &LoadContext,
    ) -> anyhow::Result<LoaderInstance> {
        Ok(LoaderInstance::new(&registry.registered_root(), context)?)
    }

    /// Load the file into `scene`; returns the container it created
    fn load(
        &self,
        _instance: &LoaderInstance,
        _scene: &mut dyn SceneBackend,
        _request: &LoadRequest,
    ) -> anyhow::Result<String> {
        anyhow::bail!("{} does not implement load", self.name())
    }

    /// Switch `container` to another published version
    fn update(
        &self,
        _container: &str,
        _instance: &LoaderInstance,
        _scene: &mut dyn SceneBackend,
    ) -> anyhow::Result<()> {
        anyhow::bail!("{} does not implement update", self.name())
    }

    /// Remove `container`; returns whether anything was deleted
    fn remove(&self, _container: &str, _scene: &mut dyn SceneBackend) -> anyhow::Result<bool> {
        anyhow::bail!("{} does not implement remove", self.name())
    }
}

/// Loader declared by a plug-in unit
///
/// A class giving a `family` but no `families` accepts that one family.
pub struct DeclaredLoader {
    spec: ClassSpec,
}

impl DeclaredLoader {
    pub fn new(spec: &ClassSpec) -> Self {
        let mut spec = spec.clone();
        if spec.families.is_empty() {
            spec.families.extend(spec.family.clone());
        }
        Self { spec }
    }
}

impl PluginDescriptor for DeclaredLoader {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn family(&self) -> Option<&str> {
        self.spec.family.as_deref()
    }

    fn label(&self) -> Option<&str> {
        self.spec.label.as_deref()
    }

    fn order(&self) -> i32 {
        self.spec.order.unwrap_or(0)
    }
}

impl LoaderPlugin for DeclaredLoader {
    fn families(&self) -> Vec<&str> {
        self.spec.families.iter().map(String::as_str).collect()
    }

    fn representations(&self) -> Vec<&str> {
        self.spec.representations.iter().map(String::as_str).collect()
    }
}

/// Loaders able to read `representation` of `family`, by order then name
pub fn loaders_for(
    registry: &PluginRegistry,
    family: &str,
    representation: &str,
) -> Result<Vec<Arc<dyn LoaderPlugin>>> {
    let mut loaders: Vec<_> = registry
        .discover::<Loader>()?
        .into_iter()
        .filter(|loader| loader.is_compatible(family, representation))
        .collect();
    loaders.sort_by_key(|loader| loader.order());
    Ok(loaders)
}
