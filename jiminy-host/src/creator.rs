//! Instance creation
//!
//! A creator turns a [`CreateRequest`] into an instance: a set in the scene
//! carrying the pipeline's identification data. [`create`] runs every
//! creator of the requested family and tolerates individual failures.

use crate::capability::{Capability, PluginDescriptor};
use crate::error::{Error, Result};
use crate::guard::isolate;
use crate::loader::{LoadedUnit, UnitEntry};
use crate::registry::PluginRegistry;
use crate::scene::{imprint, MaintainedSelection, SceneBackend};
use jiminy_plugin_api::{ClassSpec, DataMap, ProcessRequest, INSTANCE_ID};
use serde_json::Value;
use std::sync::Arc;

/// Option key asking creators to group the current selection
pub const USE_SELECTION: &str = "useSelection";

/// The `Creator` capability
pub struct Creator;

impl Capability for Creator {
    const NAME: &'static str = "Creator";
    type Class = dyn CreatorPlugin;

    fn from_spec(spec: &ClassSpec, unit: &LoadedUnit) -> anyhow::Result<Arc<Self::Class>> {
        Ok(Arc::new(DeclaredCreator::new(spec, unit)?))
    }
}

/// Determines how instances of one family are created
pub trait CreatorPlugin: PluginDescriptor {
    /// Class-level data imprinted on every instance
    fn defaults(&self) -> DataMap {
        DataMap::new()
    }

    /// Build the instance record for `request`
    fn instantiate(&self, request: &CreateRequest) -> anyhow::Result<CreatorInstance> {
        Ok(CreatorInstance::new(
            self.name(),
            self.family(),
            &self.defaults(),
            request,
        ))
    }

    /// Create the instance in `scene`; returns its identifier
    fn process(
        &self,
        instance: &CreatorInstance,
        scene: &mut dyn SceneBackend,
    ) -> anyhow::Result<String> {
        instance.build_default(scene)
    }
}

/// Arguments to [`create`]
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Subset name, also the name the set is created under
    pub name: String,
    pub asset: String,
    pub family: String,
    pub options: Option<DataMap>,
    pub data: Option<DataMap>,
}

impl CreateRequest {
    pub fn new(
        name: impl Into<String>,
        asset: impl Into<String>,
        family: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            asset: asset.into(),
            family: family.into(),
            options: None,
            data: None,
        }
    }

    /// Set an option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options
            .get_or_insert_with(DataMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add extra data; caller data wins over the defaults
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(DataMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// One creator run, ready to be processed
#[derive(Debug, Clone, PartialEq)]
pub struct CreatorInstance {
    pub name: String,
    pub asset: String,
    pub options: DataMap,
    /// Record imprinted on the set
    pub data: DataMap,
}

impl CreatorInstance {
    /// Default record merged with `class_data` and then the caller's data
    pub fn new(
        class_name: &str,
        family: Option<&str>,
        class_data: &DataMap,
        request: &CreateRequest,
    ) -> Self {
        let name = if request.name.is_empty() {
            class_name.to_string()
        } else {
            request.name.clone()
        };

        let mut data = DataMap::new();
        data.insert("id".into(), INSTANCE_ID.into());
        data.insert(
            "family".into(),
            family.map(Value::from).unwrap_or(Value::Null),
        );
        data.insert("asset".into(), request.asset.clone().into());
        data.insert("subset".into(), request.name.clone().into());
        data.insert("active".into(), true.into());
        data.extend(class_data.clone());
        if let Some(extra) = &request.data {
            data.extend(extra.clone());
        }

        Self {
            name,
            asset: request.asset.clone(),
            options: request.options.clone().unwrap_or_default(),
            data,
        }
    }

    /// Whether the caller asked for the selection to be grouped
    pub fn use_selection(&self) -> bool {
        self.options.get(USE_SELECTION).map(is_truthy).unwrap_or(false)
    }

    /// Group the selection if asked to, otherwise create an empty set
    pub fn build_default(&self, scene: &mut dyn SceneBackend) -> anyhow::Result<String> {
        let members = if self.use_selection() {
            scene.selection()?
        } else {
            Vec::new()
        };
        self.build(scene, &members, None)
    }

    /// Create the set for `members` and imprint the record, with `extra`
    /// merged on top
    pub fn build(
        &self,
        scene: &mut dyn SceneBackend,
        members: &[String],
        extra: Option<&DataMap>,
    ) -> anyhow::Result<String> {
        let set = scene.create_set(&self.name, members)?;

        match extra {
            Some(extra) if !extra.is_empty() => {
                let mut data = self.data.clone();
                data.extend(extra.clone());
                imprint(scene, &set, &data)?;
            }
            _ => imprint(scene, &set, &self.data)?,
        }

        Ok(set)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Creator declared by a plug-in unit
///
/// Manifest classes use the default process. Classes from executable units
/// ask the unit for an [`InstancePlan`](jiminy_plugin_api::InstancePlan)
/// and the host carries it out.
pub struct DeclaredCreator {
    spec: ClassSpec,
    entry: Option<Arc<dyn UnitEntry>>,
}

impl DeclaredCreator {
    pub fn new(spec: &ClassSpec, unit: &LoadedUnit) -> anyhow::Result<Self> {
        if spec.family.is_none() {
            anyhow::bail!("Creator '{}' declares no family", spec.name);
        }

        Ok(Self {
            spec: spec.clone(),
            entry: unit.entry.clone(),
        })
    }
}

impl PluginDescriptor for DeclaredCreator {
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

impl CreatorPlugin for DeclaredCreator {
    fn defaults(&self) -> DataMap {
        self.spec.data.clone()
    }

    fn process(
        &self,
        instance: &CreatorInstance,
        scene: &mut dyn SceneBackend,
    ) -> anyhow::Result<String> {
        let Some(entry) = &self.entry else {
            return instance.build_default(scene);
        };

        let request = ProcessRequest {
            class: self.spec.name.clone(),
            name: instance.name.clone(),
            asset: instance.asset.clone(),
            options: instance.options.clone(),
            data: instance.data.clone(),
            selection: scene.selection()?,
        };
        let plan = entry.process(&request)?;

        instance.build(scene, &plan.members, Some(&plan.data))
    }
}

/// Identifiers of the instances one [`create`] call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    instances: Vec<String>,
}

impl Created {
    /// Every instance, in the order the creators ran
    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    /// The instance created last
    pub fn last(&self) -> &str {
        self.instances.last().map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl IntoIterator for Created {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.into_iter()
    }
}

/// Create a new instance
///
/// Runs every discovered creator whose family equals `request.family`, in
/// discovery order. Each run happens under a [`MaintainedSelection`], so
/// the caller's selection is the same afterwards. A creator that fails is
/// logged and skipped.
///
/// # Errors
///
/// [`Error::Internal`] when no creator ran successfully; callers are
/// expected to check the family against the known creators first.
pub fn create(
    registry: &PluginRegistry,
    scene: &mut dyn SceneBackend,
    request: &CreateRequest,
) -> Result<Created> {
    let mut instances = Vec::new();

    for plugin in registry.discover::<Creator>()? {
        if plugin.family() != Some(request.family.as_str()) {
            continue;
        }

        tracing::info!(
            plugin = %plugin.name(),
            "Creating '{}' with '{}'",
            request.name,
            plugin.name()
        );

        let result = isolate(plugin.name(), || {
            let instance = plugin.instantiate(request)?;
            let mut guard = MaintainedSelection::new(&mut *scene)?;
            plugin.process(&instance, &mut *guard)
        });

        match result {
            Ok(instance) => instances.push(instance),
            Err(e) => {
                tracing::warn!(
                    plugin = %plugin.name(),
                    error = %format!("{e:#}"),
                    "Creator failed"
                );
            }
        }
    }

    if instances.is_empty() {
        return Err(Error::Internal(format!(
            "No Creator plug-ins were run for family '{}'",
            request.family
        )));
    }

    Ok(Created { instances })
}
