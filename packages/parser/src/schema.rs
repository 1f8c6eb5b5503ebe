//! # Schema Catalog
//!
//! Read-only description of every legal block path, produced by an external
//! schema source (typically a JSON dump of an application's input syntax).
//!
//! ```text
//! {"blocks": {
//!   "/Mesh":        {"parameters": [...], "subtypes": {"GeneratedMesh": {"parameters": [...]}}},
//!   "/Variables/*": {"parameters": [...]}
//! }}
//! ```
//!
//! A `*` path segment is the wildcard child schema of its parent: it governs
//! children a user may freely add under that block.

use crate::value::{ParamValue, ScalarKind, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const WILDCARD: &str = "*";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema path must start with '/': {0}")]
    InvalidPath(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,

    /// Basic type name, e.g. `Integer` or `Array:Real`
    #[serde(rename = "type", default = "default_basic_type")]
    pub basic_type: String,

    /// Implementation-level type, used by the quoting rules
    #[serde(default)]
    pub cpp_type: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_group")]
    pub group: String,
}

fn default_basic_type() -> String {
    "String".to_string()
}

fn default_group() -> String {
    "Main".to_string()
}

/// Options are either a whitespace-separated string or a list
fn deserialize_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Options {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<Options>::deserialize(deserializer)? {
        Some(Options::Text(text)) => text.split_whitespace().map(str::to_string).collect(),
        Some(Options::List(list)) => list,
        None => Vec::new(),
    })
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, basic_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            basic_type: basic_type.into(),
            cpp_type: String::new(),
            required: false,
            default: None,
            options: Vec::new(),
            description: String::new(),
            group: default_group(),
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_cpp_type(mut self, cpp_type: impl Into<String>) -> Self {
        self.cpp_type = cpp_type.into();
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::from_schema(&self.basic_type)
    }

    /// Parsed default. Booleans without a default are false; an empty
    /// default for anything else means no value.
    pub fn default_value(&self) -> Option<ParamValue> {
        let ty = self.value_type();
        let text = self.default.as_deref().unwrap_or("").trim();

        if ty == ValueType::Scalar(ScalarKind::Bool) && text.is_empty() {
            return Some(ParamValue::from(false));
        }
        if text.is_empty() {
            return None;
        }
        ty.parse_text(text).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtypeSchema {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    #[serde(default)]
    pub subtypes: IndexMap<String, SubtypeSchema>,
}

impl BlockSchema {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn subtype(&self, name: &str) -> Option<&SubtypeSchema> {
        self.subtypes.get(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    blocks: IndexMap<String, BlockSchema>,
}

/// Path-indexed schema for one executable
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    blocks: IndexMap<String, Arc<BlockSchema>>,
}

impl SchemaCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::empty();
        for (path, block) in file.blocks {
            catalog.insert(&path, block)?;
        }
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        let file = CatalogFile {
            blocks: self
                .blocks
                .iter()
                .map(|(path, block)| (path.clone(), block.as_ref().clone()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn insert(&mut self, path: &str, block: BlockSchema) -> Result<(), SchemaError> {
        if !path.starts_with('/') || path == "/" {
            return Err(SchemaError::InvalidPath(path.to_string()));
        }
        self.blocks
            .insert(path.trim_end_matches('/').to_string(), Arc::new(block));
        Ok(())
    }

    /// Builder-style insert for fixed, known-good paths
    pub fn with_block(mut self, path: &str, block: BlockSchema) -> Self {
        if let Err(err) = self.insert(path, block) {
            tracing::warn!(%err, "Ignoring schema block");
        }
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Schema for a concrete block path. Each segment matches exactly or,
    /// failing that, a `*` entry at the same depth.
    pub fn lookup(&self, path: &str) -> Option<&Arc<BlockSchema>> {
        if let Some(block) = self.blocks.get(path) {
            return Some(block);
        }
        let segments = split_path(path);
        if segments.is_empty() {
            return None;
        }
        self.lookup_segments(&segments, String::new())
    }

    fn lookup_segments(&self, rest: &[&str], prefix: String) -> Option<&Arc<BlockSchema>> {
        let Some((head, tail)) = rest.split_first() else {
            return self.blocks.get(&prefix);
        };

        let exact = format!("{}/{}", prefix, head);
        if self.has_prefix(&exact) {
            if let Some(found) = self.lookup_segments(tail, exact) {
                return Some(found);
            }
        }
        if *head != WILDCARD {
            let wild = format!("{}/{}", prefix, WILDCARD);
            if self.has_prefix(&wild) {
                return self.lookup_segments(tail, wild);
            }
        }
        None
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        self.blocks.keys().any(|key| {
            key == prefix
                || (key.starts_with(prefix) && key.as_bytes().get(prefix.len()) == Some(&b'/'))
        })
    }

    /// Wildcard child schema governing user-added children of `path`
    pub fn wildcard_for(&self, path: &str) -> Option<&Arc<BlockSchema>> {
        self.lookup(&join_path(path, WILDCARD))
    }

    /// Names of schema-declared, non-wildcard children of `path`, in catalog order
    pub fn children_of(&self, path: &str) -> Vec<String> {
        let parent = split_path(path);
        let mut names: Vec<String> = Vec::new();

        for key in self.blocks.keys() {
            let segments = split_path(key);
            let Some((last, prefix)) = segments.split_last() else {
                continue;
            };
            if *last == WILDCARD || prefix.len() != parent.len() {
                continue;
            }
            let matches = prefix
                .iter()
                .zip(&parent)
                .all(|(schema_seg, seg)| schema_seg == seg || *schema_seg == WILDCARD);
            if matches && !names.iter().any(|n| n == last) {
                names.push(last.to_string());
            }
        }

        names
    }
}

/// Produces a catalog for an executable. Running the executable is the
/// caller's concern; implementations only locate and decode its dump.
pub trait SchemaSource {
    fn load(&self, executable: &Path) -> Result<SchemaCatalog, SchemaError>;
}

/// Reads a JSON dump, either from an explicit file or next to the executable
/// (`<executable>.json`).
#[derive(Debug, Clone, Default)]
pub struct JsonFileSchemaSource {
    pub path: Option<PathBuf>,
}

impl JsonFileSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl SchemaSource for JsonFileSchemaSource {
    fn load(&self, executable: &Path) -> Result<SchemaCatalog, SchemaError> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => executable.with_extension("json"),
        };
        tracing::debug!(path = %path.display(), "Loading schema dump");
        SchemaCatalog::from_path(&path)
    }
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Child path under `parent`; the root is `/`
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent path of a block path; `None` for the root
pub fn parent_path(path: &str) -> Option<String> {
    if path == "/" || path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => Some("/".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "blocks": {
            "/Mesh": {
                "parameters": [
                    {"name": "file", "type": "String", "cpp_type": "FileName"},
                    {"name": "uniform_refine", "type": "Integer", "default": "0"}
                ],
                "subtypes": {
                    "GeneratedMesh": {"parameters": [{"name": "dim", "type": "Integer", "options": "1 2 3"}]}
                }
            },
            "/Variables/*": {"parameters": [{"name": "order", "type": "String", "default": "FIRST"}]},
            "/Variables/*/InitialCondition": {"parameters": []},
            "/Executioner": {"parameters": [{"name": "solve", "type": "Boolean"}]}
        }
    }"#;

    #[test]
    fn test_load_catalog() {
        let catalog = SchemaCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 4);

        let mesh = catalog.lookup("/Mesh").unwrap();
        assert_eq!(mesh.parameters.len(), 2);
        assert_eq!(mesh.parameters[0].group, "Main");
        let dim = &mesh.subtype("GeneratedMesh").unwrap().parameters[0];
        assert_eq!(dim.options, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_wildcard_lookup() {
        let catalog = SchemaCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.lookup("/Variables/u").is_some());
        assert!(catalog.lookup("/Variables/u/InitialCondition").is_some());
        assert!(catalog.lookup("/Variables").is_none());
        assert!(catalog.wildcard_for("/Variables").is_some());
        assert!(catalog.wildcard_for("/Mesh").is_none());
        assert!(catalog.lookup("/Nope").is_none());
    }

    #[test]
    fn test_children_of() {
        let catalog = SchemaCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.children_of("/"), vec!["Mesh", "Executioner"]);
        assert_eq!(
            catalog.children_of("/Variables/u"),
            vec!["InitialCondition"]
        );
        assert!(catalog.children_of("/Variables").is_empty());
    }

    #[test]
    fn test_defaults() {
        let catalog = SchemaCatalog::from_json(CATALOG).unwrap();
        let solve = &catalog.lookup("/Executioner").unwrap().parameters[0];
        assert_eq!(solve.default_value(), Some(ParamValue::from(false)));
        let file = &catalog.lookup("/Mesh").unwrap().parameters[0];
        assert_eq!(file.default_value(), None);
    }

    #[test]
    fn test_rejects_relative_paths() {
        let err = SchemaCatalog::from_json(r#"{"blocks": {"Mesh": {}}}"#).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPath(_)));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("/", "Mesh"), "/Mesh");
        assert_eq!(join_path("/Mesh", "gen"), "/Mesh/gen");
        assert_eq!(parent_path("/Mesh/gen").as_deref(), Some("/Mesh"));
        assert_eq!(parent_path("/Mesh").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }
}
