// src/document.rs
//! Simulation documents holding manager scripts
//!
//! A simulation document is a JSON tree of model nodes. Each node has a
//! `Name` and may have `Children`. Manager nodes carry their script in
//! `Code` and user-set values in `Parameters`, a list of `{Key, Value}`
//! objects:
//!
//! ```json
//! {
//!   "Name": "Simulations",
//!   "Children": [
//!     { "Name": "Sow", "Code": "using Models.Core; ...", "Parameters": [
//!         { "Key": "Crop", "Value": "Wheat" }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Other fields are preserved untouched when the document is saved.

use crate::error::{Error, Result};
use crate::migration::{move_variables, RenameRule};
use crate::script::parser::ScriptParser;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A user-set parameter of a manager node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// Snapshot of one node carrying a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptNode {
    /// Dotted path of node names from the root, e.g. `.Simulations.Field.Sow`
    pub path: String,
    /// JSON pointer to the node
    pointer: String,
    pub code: String,
    parameters: Vec<Parameter>,
}

impl ScriptNode {
    pub fn parser(&self) -> ScriptParser {
        ScriptParser::new(&self.code)
    }

    /// Parameters in document order
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

/// A simulation document
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationDocument {
    root: Value,
}

impl FromStr for SimulationDocument {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        if !root.is_object() {
            return Err(Error::Document(
                "top level of a simulation document must be an object".to_string(),
            ));
        }
        Ok(Self { root })
    }
}

impl SimulationDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string_pretty()?)?;
        info!("Saved simulation document to {}", path.display());
        Ok(())
    }

    pub fn to_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Every node with a `Code` string, in document order
    pub fn script_nodes(&self) -> Vec<ScriptNode> {
        let mut nodes = Vec::new();
        collect_script_nodes(&self.root, "", "", &mut nodes);
        nodes
    }

    /// Replace the script of `node`
    pub fn set_code(&mut self, node: &ScriptNode, code: &str) -> Result<()> {
        let object = self.node_mut(node)?;
        object.insert("Code".to_string(), Value::String(code.to_string()));
        Ok(())
    }

    /// Set the value of an existing parameter of `node`
    ///
    /// Returns false when the node has no parameter with that key.
    pub fn update_parameter(&mut self, node: &ScriptNode, key: &str, value: &str) -> Result<bool> {
        let object = self.node_mut(node)?;
        let Some(Value::Array(parameters)) = object.get_mut("Parameters") else {
            return Ok(false);
        };

        let mut updated = false;
        for parameter in parameters.iter_mut().filter_map(Value::as_object_mut) {
            if parameter.get("Key").and_then(Value::as_str) == Some(key) {
                parameter.insert("Value".to_string(), Value::String(value.to_string()));
                updated = true;
            }
        }
        Ok(updated)
    }

    /// Apply rename rules to every script
    ///
    /// Only scripts that changed are written back. Returns the number of
    /// scripts changed.
    pub fn move_variables(&mut self, rules: &[RenameRule]) -> Result<usize> {
        let mut changed = 0;
        for node in self.script_nodes() {
            let mut parser = node.parser();
            if !move_variables(&mut parser, rules)? {
                continue;
            }

            debug!("Moved variables in {}", node.path);
            self.set_code(&node, &parser.to_string())?;
            changed += 1;
        }
        Ok(changed)
    }

    fn node_mut(&mut self, node: &ScriptNode) -> Result<&mut serde_json::Map<String, Value>> {
        self.root
            .pointer_mut(&node.pointer)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::Document(format!("Node {} no longer exists", node.path)))
    }
}

fn collect_script_nodes(value: &Value, parent_path: &str, pointer: &str, nodes: &mut Vec<ScriptNode>) {
    let Some(object) = value.as_object() else {
        return;
    };

    let name = object.get("Name").and_then(Value::as_str).unwrap_or_default();
    let path = format!("{}.{}", parent_path, name);

    if let Some(code) = object.get("Code").and_then(Value::as_str) {
        nodes.push(ScriptNode {
            path: path.clone(),
            pointer: pointer.to_string(),
            code: code.to_string(),
            parameters: read_parameters(object.get("Parameters")),
        });
    }

    if let Some(Value::Array(children)) = object.get("Children") {
        for (index, child) in children.iter().enumerate() {
            let child_pointer = format!("{}/Children/{}", pointer, index);
            collect_script_nodes(child, &path, &child_pointer, nodes);
        }
    }
}

fn read_parameters(value: Option<&Value>) -> Vec<Parameter> {
    let Some(Value::Array(parameters)) = value else {
        return Vec::new();
    };

    parameters
        .iter()
        .filter_map(|parameter| {
            let key = parameter.get("Key")?.as_str()?;
            let value = match parameter.get("Value")? {
                Value::String(value) => value.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            Some(Parameter {
                key: key.to_string(),
                value,
            })
        })
        .collect()
}
