//! Capabilities and the classes implementing them
//!
//! A capability is a named contract (for example `"Creator"`). Plug-in
//! classes declare their bases by name; a class implements a capability when
//! the capability's name appears among its transitive bases. Matching by
//! name rather than by type keeps classes from independently loaded units
//! interchangeable.

use crate::loader::LoadedUnit;
use jiminy_plugin_api::ClassSpec;
use std::collections::HashSet;
use std::sync::Arc;

/// Fields every discoverable plug-in exposes
pub trait PluginDescriptor: Send + Sync {
    /// Identity used for de-duplication and ordering
    fn name(&self) -> &str;

    /// Domain tag the plug-in applies to
    fn family(&self) -> Option<&str> {
        None
    }

    /// Human readable label
    fn label(&self) -> Option<&str> {
        None
    }

    /// Sort/execution priority
    fn order(&self) -> i32 {
        0
    }
}

/// A named contract plug-ins can implement
pub trait Capability: 'static {
    /// Stable identifier classes name as a base
    const NAME: &'static str;

    /// Handle type discovery yields, usually a trait object
    type Class: PluginDescriptor + ?Sized + 'static;

    /// Build a handle from a class found in a loaded unit
    ///
    /// `spec` already carries the fields inherited from its ancestors.
    /// Returning an error skips the class.
    fn from_spec(spec: &ClassSpec, unit: &LoadedUnit) -> anyhow::Result<Arc<Self::Class>>;
}

/// Classes of `unit` implementing `capability`, with inherited fields resolved
///
/// Classes without bases are ignored. Ancestors are followed through other
/// classes of the same unit; a base that is not declared in the unit is a
/// leaf and only its name is compared.
pub fn classes_implementing(classes: &[ClassSpec], capability: &str) -> Vec<ClassSpec> {
    classes
        .iter()
        .filter(|class| !class.bases.is_empty())
        .filter(|class| {
            ancestors(classes, class)
                .iter()
                .any(|base| base.as_str() == capability)
        })
        .map(|class| resolve(classes, class))
        .collect()
}

/// Transitive base names of `class`, nearest first
fn ancestors(classes: &[ClassSpec], class: &ClassSpec) -> Vec<String> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(class.name.clone());
    collect_bases(classes, class, &mut seen, &mut found);
    found
}

fn collect_bases(
    classes: &[ClassSpec],
    class: &ClassSpec,
    seen: &mut HashSet<String>,
    found: &mut Vec<String>,
) {
    for base in &class.bases {
        found.push(base.clone());
        if !seen.insert(base.clone()) {
            continue;
        }
        if let Some(parent) = classes.iter().find(|c| &c.name == base) {
            collect_bases(classes, parent, seen, found);
        }
    }
}

/// Fill unset fields from ancestors; the nearest ancestor wins and `data`
/// merges base-first so the class's own entries win
fn resolve(classes: &[ClassSpec], class: &ClassSpec) -> ClassSpec {
    let mut resolved = class.clone();
    let lineage: Vec<&ClassSpec> = ancestors(classes, class)
        .iter()
        .filter_map(|name| classes.iter().find(|c| &c.name == name))
        .collect();

    for parent in &lineage {
        if resolved.family.is_none() {
            resolved.family = parent.family.clone();
        }
        if resolved.label.is_none() {
            resolved.label = parent.label.clone();
        }
        if resolved.order.is_none() {
            resolved.order = parent.order;
        }
        if resolved.families.is_empty() {
            resolved.families = parent.families.clone();
        }
        if resolved.representations.is_empty() {
            resolved.representations = parent.representations.clone();
        }
    }

    let mut data = jiminy_plugin_api::DataMap::new();
    for parent in lineage.iter().rev() {
        data.extend(parent.data.clone());
    }
    data.extend(class.data.clone());
    resolved.data = data;

    resolved
}
