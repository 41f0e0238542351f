//! jiminy-plugin-api: Shared types for the jiminy plug-in system
//!
//! This crate defines what a plug-in unit declares (classes and the
//! capabilities they derive from) and the protocol between the host and
//! a Wasm guest. Guest communication uses MessagePack serialization.

use serde::{Deserialize, Serialize};

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// Key/value record imprinted onto scene objects
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Identifier imprinted on every instance created by the pipeline
pub const INSTANCE_ID: &str = "pyblish.jiminy.instance";

/// Everything a loaded unit exports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// API version for compatibility
    #[serde(default = "default_api_version")]
    pub api_version: u32,

    /// Top-level classes declared by the unit
    #[serde(rename = "class", default)]
    pub classes: Vec<ClassSpec>,
}

fn default_api_version() -> u32 {
    API_VERSION
}

/// A class declared by a plug-in unit
///
/// Classes name their bases by string. A class implements a capability
/// when the capability's name appears anywhere among its transitive bases,
/// so independently loaded copies of a capability are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    /// Class name, also the identity used for de-duplication
    pub name: String,

    /// Direct bases (other classes of the same unit, or capability names)
    #[serde(default)]
    pub bases: Vec<String>,

    /// Domain tag the class applies to (e.g. an asset category)
    #[serde(default)]
    pub family: Option<String>,

    /// Human readable label
    #[serde(default)]
    pub label: Option<String>,

    /// Sort/execution priority; unset means inherited or 0
    #[serde(default)]
    pub order: Option<i32>,

    /// Extra data imprinted on instances created by this class
    #[serde(default)]
    pub data: DataMap,

    /// Families a loader class accepts
    #[serde(default)]
    pub families: Vec<String>,

    /// Representation names a loader class reads (`ma`, `abc`, ...)
    #[serde(default)]
    pub representations: Vec<String>,
}

/// Input handed to a guest's `plugin_process`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Class being run
    pub class: String,

    /// Subset name requested by the caller
    pub name: String,

    /// Asset the instance belongs to
    pub asset: String,

    /// Options from the caller (GUI toggles and such)
    #[serde(default)]
    pub options: DataMap,

    /// Instance data the host is about to imprint
    #[serde(default)]
    pub data: DataMap,

    /// Scene selection at the time of the request
    #[serde(default)]
    pub selection: Vec<String>,
}

/// What the host should create on behalf of a guest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstancePlan {
    /// Nodes grouped into the instance set
    #[serde(default)]
    pub members: Vec<String>,

    /// Data merged over the instance data before imprinting
    #[serde(default)]
    pub data: DataMap,
}

/// Result of a guest process call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessResult {
    /// The host should create the planned instance
    Create(InstancePlan),

    /// The class refused to run
    Error(ProcessError),
}

/// Error details from a guest process call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessError {
    /// Error message
    pub message: String,
}

impl ModuleManifest {
    /// Create a manifest for the current API version
    pub fn new() -> Self {
        Self {
            api_version: API_VERSION,
            classes: Vec::new(),
        }
    }

    /// Add a class
    pub fn class(mut self, class: ClassSpec) -> Self {
        self.classes.push(class);
        self
    }
}

impl Default for ModuleManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassSpec {
    /// Create a class deriving from `base`
    pub fn new(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: vec![base.into()],
            ..Default::default()
        }
    }

    /// Set family
    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// Set label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set order
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Add a default data entry
    pub fn data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Accept another family when loading
    pub fn accepts(mut self, family: impl Into<String>) -> Self {
        self.families.push(family.into());
        self
    }

    /// Read another representation when loading
    pub fn reads(mut self, representation: impl Into<String>) -> Self {
        self.representations.push(representation.into());
        self
    }
}

impl ProcessResult {
    /// Plan an instance grouping `members`
    pub fn create(members: Vec<String>) -> Self {
        Self::Create(InstancePlan {
            members,
            data: DataMap::new(),
        })
    }

    /// Refuse to run
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ProcessError {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_messagepack_keeps_classes() {
        let manifest = ModuleManifest::new().class(
            ClassSpec::new("BoxCreator", "Creator")
                .family("box")
                .order(2)
                .data("color", "red"),
        );

        let bytes = rmp_serde::to_vec(&manifest).unwrap();
        let decoded: ModuleManifest = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(decoded.api_version, API_VERSION);
        assert_eq!(decoded.classes, manifest.classes);
    }

    #[test]
    fn test_process_result_constructors() {
        match ProcessResult::create(vec!["pCube1".into()]) {
            ProcessResult::Create(plan) => {
                assert_eq!(plan.members, vec!["pCube1"]);
                assert!(plan.data.is_empty());
            }
            _ => panic!("Expected create"),
        }

        match ProcessResult::error("nope") {
            ProcessResult::Error(e) => assert_eq!(e.message, "nope"),
            _ => panic!("Expected error"),
        }
    }
}
