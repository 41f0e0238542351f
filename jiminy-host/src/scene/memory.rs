//! In-process scene backend
//!
//! Used when no host application is attached (batch tools, the CLI, tests).
//! Naming follows the usual host conventions: a requested name that is
//! already taken gets a numeric suffix.

use super::{AttributeValue, SceneBackend};
use crate::error::SceneError;
use std::collections::BTreeMap;

/// A node in a [`MemoryScene`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneNode {
    /// Members, for set nodes
    pub members: Option<Vec<String>>,

    /// User attributes
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SceneNode {
    /// Whether the node is a set
    pub fn is_set(&self) -> bool {
        self.members.is_some()
    }
}

/// A scene living entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    nodes: BTreeMap<String, SceneNode>,
    selection: Vec<String>,
}

impl MemoryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a plain node, returning the name it got
    pub fn create_node(&mut self, name: &str) -> Result<String, SceneError> {
        let name = self.unique_name(name)?;
        self.nodes.insert(name.clone(), SceneNode::default());
        Ok(name)
    }

    /// Look up a node
    pub fn node(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.get(name)
    }

    /// Look up an attribute value
    pub fn attribute(&self, node: &str, key: &str) -> Option<&AttributeValue> {
        self.nodes.get(node).and_then(|n| n.attributes.get(key))
    }

    /// Names of all set nodes
    pub fn sets(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_set())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn unique_name(&self, requested: &str) -> Result<String, SceneError> {
        let valid = requested
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && requested
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(SceneError::InvalidName(requested.to_string()));
        }

        if !self.nodes.contains_key(requested) {
            return Ok(requested.to_string());
        }

        let stem = requested.trim_end_matches(|c: char| c.is_ascii_digit());
        let name = (1u32..)
            .map(|i| format!("{}{}", stem, i))
            .find(|candidate| !self.nodes.contains_key(candidate))
            .unwrap_or_else(|| requested.to_string());
        Ok(name)
    }

    fn require(&self, nodes: &[String]) -> Result<(), SceneError> {
        match nodes.iter().find(|n| !self.nodes.contains_key(n.as_str())) {
            Some(missing) => Err(SceneError::NodeNotFound(missing.clone())),
            None => Ok(()),
        }
    }
}

impl SceneBackend for MemoryScene {
    fn selection(&self) -> Result<Vec<String>, SceneError> {
        Ok(self.selection.clone())
    }

    fn select(&mut self, nodes: &[String]) -> Result<(), SceneError> {
        self.require(nodes)?;
        self.selection.clear();
        for node in nodes {
            if !self.selection.contains(node) {
                self.selection.push(node.clone());
            }
        }
        Ok(())
    }

    fn clear_selection(&mut self) -> Result<(), SceneError> {
        self.selection.clear();
        Ok(())
    }

    fn create_set(&mut self, name: &str, members: &[String]) -> Result<String, SceneError> {
        self.require(members)?;
        let name = self.unique_name(name)?;
        self.nodes.insert(
            name.clone(),
            SceneNode {
                members: Some(members.to_vec()),
                attributes: BTreeMap::new(),
            },
        );
        tracing::debug!(set = %name, members = members.len(), "Created set");
        Ok(name)
    }

    fn set_attribute(
        &mut self,
        node: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<(), SceneError> {
        let target = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| SceneError::NodeNotFound(node.to_string()))?;
        target.attributes.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_set_renames_on_conflict() {
        let mut scene = MemoryScene::new();

        assert_eq!(scene.create_set("modelMain", &[]).unwrap(), "modelMain");
        assert_eq!(scene.create_set("modelMain", &[]).unwrap(), "modelMain1");
        assert_eq!(scene.create_set("modelMain", &[]).unwrap(), "modelMain2");
        assert_eq!(scene.sets(), vec!["modelMain", "modelMain1", "modelMain2"]);
    }

    #[test]
    fn test_create_set_requires_members() {
        let mut scene = MemoryScene::new();
        scene.create_node("pCube1").unwrap();

        let set = scene
            .create_set("rigMain", &["pCube1".to_string()])
            .unwrap();
        assert_eq!(
            scene.node(&set).unwrap().members,
            Some(vec!["pCube1".to_string()])
        );

        assert!(matches!(
            scene.create_set("rigMain", &["pSphere1".to_string()]),
            Err(SceneError::NodeNotFound(n)) if n == "pSphere1"
        ));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut scene = MemoryScene::new();
        assert!(matches!(
            scene.create_node("1abc"),
            Err(SceneError::InvalidName(_))
        ));
        assert!(matches!(
            scene.create_set("has space", &[]),
            Err(SceneError::InvalidName(_))
        ));
    }

    #[test]
    fn test_select_replaces_selection() {
        let mut scene = MemoryScene::new();
        scene.create_node("a").unwrap();
        scene.create_node("b").unwrap();

        scene.select(&["a".to_string()]).unwrap();
        scene.select(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(scene.selection().unwrap(), vec!["b", "a"]);

        assert!(scene.select(&["c".to_string()]).is_err());
        assert_eq!(scene.selection().unwrap(), vec!["b", "a"]);
    }
}
