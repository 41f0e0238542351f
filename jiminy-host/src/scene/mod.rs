//! Scene backend seam
//!
//! The host application's scene graph is reached only through
//! [`SceneBackend`]. Everything the pipeline does to a scene (querying and
//! replacing the selection, creating instance sets, writing attributes) goes
//! through this trait.

mod memory;

pub use memory::{MemoryScene, SceneNode};

use crate::error::{Error, Result, SceneError};
use jiminy_plugin_api::DataMap;
use serde_json::Value;
use std::ops::{Deref, DerefMut};

/// Typed attribute value stored on a scene object
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    String(String),
    Int(i64),
    Float(f64),
}

/// Operations the pipeline needs from a host scene
pub trait SceneBackend {
    /// Current selection, in selection order
    fn selection(&self) -> std::result::Result<Vec<String>, SceneError>;

    /// Replace the selection with `nodes`
    fn select(&mut self, nodes: &[String]) -> std::result::Result<(), SceneError>;

    /// Deselect everything
    fn clear_selection(&mut self) -> std::result::Result<(), SceneError>;

    /// Create a persistent set grouping `members`; returns the name it got
    fn create_set(
        &mut self,
        name: &str,
        members: &[String],
    ) -> std::result::Result<String, SceneError>;

    /// Add (or overwrite) a user attribute on `node`
    fn set_attribute(
        &mut self,
        node: &str,
        key: &str,
        value: AttributeValue,
    ) -> std::result::Result<(), SceneError>;
}

impl AttributeValue {
    /// Convert a data value, rejecting types the scene cannot store
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        let unsupported = |kind| Error::UnsupportedType {
            key: key.to_string(),
            kind,
        };

        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_u64() {
                    Err(unsupported("unsigned integer out of range"))
                } else {
                    n.as_f64().map(Self::Float).ok_or_else(|| unsupported("number"))
                }
            }
            Value::Null => Err(unsupported("null")),
            Value::Array(_) => Err(unsupported("array")),
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    /// Name of the attribute type, as hosts usually spell it
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Int(_) => "long",
            Self::Float(_) => "double",
        }
    }
}

/// Write `data` to `node` as user attributes
///
/// Every value is checked before anything is written, so a record holding
/// an unsupported value leaves the node untouched.
pub fn imprint(scene: &mut dyn SceneBackend, node: &str, data: &DataMap) -> Result<()> {
    let attributes = data
        .iter()
        .map(|(key, value)| AttributeValue::from_json(key, value).map(|v| (key, v)))
        .collect::<Result<Vec<_>>>()?;

    for (key, value) in attributes {
        tracing::trace!(node, key = %key, kind = value.type_name(), "Imprinting attribute");
        scene.set_attribute(node, key, value)?;
    }

    Ok(())
}

/// Restores the scene selection when dropped
///
/// # Example
///
/// ```
/// use jiminy_host::scene::{MaintainedSelection, MemoryScene, SceneBackend};
///
/// let mut scene = MemoryScene::new();
/// scene.create_node("persp").unwrap();
/// scene.create_node("Test").unwrap();
/// scene.select(&["persp".to_string()]).unwrap();
///
/// {
///     let mut guard = MaintainedSelection::new(&mut scene).unwrap();
///     guard.select(&["Test".to_string()]).unwrap();
/// }
///
/// assert_eq!(scene.selection().unwrap(), vec!["persp"]);
/// ```
pub struct MaintainedSelection<'a> {
    scene: &'a mut dyn SceneBackend,
    previous: Vec<String>,
}

impl<'a> MaintainedSelection<'a> {
    /// Capture the current selection of `scene`
    pub fn new(scene: &'a mut dyn SceneBackend) -> std::result::Result<Self, SceneError> {
        let previous = scene.selection()?;
        Ok(Self { scene, previous })
    }

    /// Selection that will be restored
    pub fn previous(&self) -> &[String] {
        &self.previous
    }
}

impl<'a> Deref for MaintainedSelection<'a> {
    type Target = dyn SceneBackend + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.scene
    }
}

impl<'a> DerefMut for MaintainedSelection<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.scene
    }
}

impl Drop for MaintainedSelection<'_> {
    fn drop(&mut self) {
        let restored = if self.previous.is_empty() {
            self.scene.clear_selection()
        } else {
            self.scene.select(&self.previous)
        };

        if let Err(e) = restored {
            tracing::warn!(error = %e, "Failed to restore selection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DataMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_attribute_value_conversion() {
        assert_eq!(
            AttributeValue::from_json("a", &json!(true)).unwrap(),
            AttributeValue::Bool(true)
        );
        assert_eq!(
            AttributeValue::from_json("a", &json!(6)).unwrap(),
            AttributeValue::Int(6)
        );
        assert_eq!(
            AttributeValue::from_json("a", &json!(0.5)).unwrap(),
            AttributeValue::Float(0.5)
        );
        assert_eq!(
            AttributeValue::from_json("a", &json!("box")).unwrap(),
            AttributeValue::String("box".into())
        );
        assert!(AttributeValue::from_json("a", &json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_imprint_writes_typed_attributes() {
        let mut scene = MemoryScene::new();
        let set = scene.create_set("modelDefault", &[]).unwrap();

        imprint(
            &mut scene,
            &set,
            &data(json!({"family": "model", "active": true, "version": 3})),
        )
        .unwrap();

        assert_eq!(
            scene.attribute(&set, "family"),
            Some(&AttributeValue::String("model".into()))
        );
        assert_eq!(
            scene.attribute(&set, "active"),
            Some(&AttributeValue::Bool(true))
        );
        assert_eq!(
            scene.attribute(&set, "version"),
            Some(&AttributeValue::Int(3))
        );
    }

    #[test]
    fn test_imprint_rejects_unsupported_types() {
        let mut scene = MemoryScene::new();
        let set = scene.create_set("modelDefault", &[]).unwrap();

        let err = imprint(
            &mut scene,
            &set,
            &data(json!({"family": "model", "tags": ["a", "b"]})),
        )
        .unwrap_err();

        match err {
            Error::UnsupportedType { key, kind } => {
                assert_eq!(key, "tags");
                assert_eq!(kind, "array");
            }
            other => panic!("Expected UnsupportedType, got {other:?}"),
        }
        assert!(scene.attribute(&set, "family").is_none());
    }

    #[test]
    fn test_maintained_selection_restores_empty_selection() {
        let mut scene = MemoryScene::new();
        scene.create_node("pCube1").unwrap();

        {
            let mut guard = MaintainedSelection::new(&mut scene).unwrap();
            assert!(guard.previous().is_empty());
            guard.select(&["pCube1".to_string()]).unwrap();
            assert_eq!(guard.selection().unwrap(), vec!["pCube1"]);
        }

        assert!(scene.selection().unwrap().is_empty());
    }
}
