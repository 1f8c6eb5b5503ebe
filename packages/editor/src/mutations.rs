//! # Tree Mutations
//!
//! Structured-editor operations on a live block tree.
//!
//! Every mutation is validated against the tree before anything is touched,
//! so a rejected mutation leaves the tree exactly as it was. Each one only
//! changes the `parameters`, children, or active subtype of the blocks it
//! names.
//!
//! ## Semantics
//!
//! ### AddChild
//! - Naming an unused schema child includes it in the live tree
//! - Otherwise a fresh user block is built from the parent's wildcard
//!   schema; a taken name gets the first free `_N` suffix, no name at all
//!   gives `New_N`
//!
//! ### Remove
//! - Detaches the block from either child list
//! - A schema-declared block is offered again as a fresh unused entry
//!
//! ### Rename
//! - Only user-added blocks; the whole subtree's paths follow
//!
//! ### SetSubtype
//! - Carries over subtype parameters whose name and type match; the block's
//!   own parameters are untouched
//! - Writing `type` on a block with subtypes is the same switch
//!
//! ### SetValue / SetValueText / AddParameter
//! - Rejected when the value cannot be written back as document text

use hitedit_parser::{
    parent_path, split_path, BlockNode, ParamValue, ParameterSlot, SchemaCatalog, TYPE_PARAM,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{IdChanges, OpaqueId};

/// Semantic mutations issued by the structured editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Mutation {
    /// Add a block under `parent_path`, by name, by subtype, or both
    AddChild {
        parent_path: String,
        name: Option<String>,
        subtype: Option<String>,
    },

    /// Remove a block and its subtree
    Remove { path: String },

    /// Rename a user-added block
    Rename { path: String, new_name: String },

    /// Switch the active subtype of a block
    SetSubtype { path: String, subtype: String },

    /// Set a typed value
    SetValue {
        path: String,
        parameter: String,
        value: ParamValue,
    },

    /// Set a value from text, parsed per the slot's declared type
    SetValueText {
        path: String,
        parameter: String,
        text: String,
    },

    /// Add a free-form string parameter the schema does not declare
    AddParameter {
        path: String,
        name: String,
        value: String,
    },

    /// Replace a parameter's comment
    SetComment {
        path: String,
        parameter: String,
        comment: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Block not found: {0}")]
    NodeNotFound(String),

    #[error("Parent not found: {0}")]
    ParentNotFound(String),

    #[error("A block named '{name}' already exists under {parent}")]
    NameCollision { parent: String, name: String },

    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    #[error("Only user-added blocks can be renamed: {0}")]
    NotUserAdded(String),

    #[error("Unknown subtype '{subtype}' for {path}")]
    UnknownSubtype { path: String, subtype: String },

    #[error("Block {0} does not accept user-named children")]
    NoWildcardSchema(String),

    #[error("Type mismatch for {path}/{parameter}: {message}")]
    TypeMismatch {
        path: String,
        parameter: String,
        message: String,
    },

    #[error("Parameter not found: {path}/{parameter}")]
    ParameterNotFound { path: String, parameter: String },

    #[error("Parameter already exists: {path}/{parameter}")]
    DuplicateParameter { path: String, parameter: String },

    #[error("The root block cannot be removed or renamed")]
    RootNotEditable,
}

/// Where a mutation landed in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Path of the affected block before the mutation
    pub old_path: String,
    /// Path of the affected block after the mutation
    pub path: String,
    /// Whether block structure or subtype changed (ids may move)
    pub structural: bool,
}

impl Applied {
    fn structure(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            path: path.into(),
            structural: true,
        }
    }

    fn parameters(path: &str) -> Self {
        Self {
            old_path: path.to_string(),
            path: path.to_string(),
            structural: false,
        }
    }
}

impl Mutation {
    /// Apply mutation to a tree with validation
    pub fn apply(
        &self,
        root: &mut BlockNode,
        catalog: &SchemaCatalog,
    ) -> Result<Applied, MutationError> {
        self.validate(root)?;

        match self {
            Mutation::AddChild {
                parent_path,
                name,
                subtype,
            } => Self::apply_add_child(root, catalog, parent_path, name.as_deref(), subtype.as_deref()),

            Mutation::Remove { path } => Self::apply_remove(root, catalog, path),

            Mutation::Rename { path, new_name } => Self::apply_rename(root, path, new_name),

            Mutation::SetSubtype { path, subtype } => {
                Self::block_mut(root, path)?.switch_subtype(subtype);
                Ok(Applied::structure(path.as_str(), path.as_str()))
            }

            Mutation::SetValue {
                path,
                parameter,
                value,
            } => {
                if is_type_write(Self::block(root, path)?, parameter) {
                    let subtype = value.as_str().unwrap_or_default();
                    Self::block_mut(root, path)?.switch_subtype(subtype);
                    return Ok(Applied::structure(path.as_str(), path.as_str()));
                }
                Self::slot_mut(root, path, parameter)?
                    .set_value(value.clone())
                    .map_err(|e| type_mismatch(path, parameter, e))?;
                Ok(Applied::parameters(path))
            }

            Mutation::SetValueText {
                path,
                parameter,
                text,
            } => {
                if is_type_write(Self::block(root, path)?, parameter) {
                    Self::block_mut(root, path)?.switch_subtype(text.trim());
                    return Ok(Applied::structure(path.as_str(), path.as_str()));
                }
                let slot = Self::slot_mut(root, path, parameter)?;
                let value = slot
                    .check_text(text)
                    .map_err(|e| type_mismatch(path, parameter, e))?;
                slot.set_value(value)
                    .map_err(|e| type_mismatch(path, parameter, e))?;
                Ok(Applied::parameters(path))
            }

            Mutation::AddParameter { path, name, value } => {
                Self::block_mut(root, path)?
                    .add_user_parameter(ParameterSlot::user(name.as_str(), value.as_str()));
                Ok(Applied::parameters(path))
            }

            Mutation::SetComment {
                path,
                parameter,
                comment,
            } => {
                Self::slot_mut(root, path, parameter)?.comments = comment.clone();
                Ok(Applied::parameters(path))
            }
        }
    }

    fn apply_add_child(
        root: &mut BlockNode,
        catalog: &SchemaCatalog,
        parent_path: &str,
        name: Option<&str>,
        subtype: Option<&str>,
    ) -> Result<Applied, MutationError> {
        let parent = root
            .find_mut(parent_path)
            .ok_or_else(|| MutationError::ParentNotFound(parent_path.to_string()))?;

        if let Some(name) = name.filter(|n| parent.unused_child(n).is_some()) {
            parent.include_child(name);
            let child = parent
                .child_mut(name)
                .ok_or_else(|| MutationError::NodeNotFound(name.to_string()))?;
            if let Some(subtype) = subtype {
                child.switch_subtype(subtype);
            }
            let path = child.path().to_string();
            return Ok(Applied::structure(path.as_str(), path.as_str()));
        }

        let name = fresh_child_name(parent, name);
        let mut node = BlockNode::instantiate(catalog, parent.path(), &name);
        if let Some(subtype) = subtype {
            node.switch_subtype(subtype);
        }
        node.user_added = true;
        let path = node.path().to_string();
        parent.insert_child(node);

        Ok(Applied::structure(path.as_str(), path.as_str()))
    }

    fn apply_remove(
        root: &mut BlockNode,
        catalog: &SchemaCatalog,
        path: &str,
    ) -> Result<Applied, MutationError> {
        let (parent_path, name) = split_child_path(path)?;
        let parent = root
            .find_mut(&parent_path)
            .ok_or_else(|| MutationError::ParentNotFound(parent_path.clone()))?;
        let removed = parent
            .take_child(&name)
            .ok_or_else(|| MutationError::NodeNotFound(path.to_string()))?;

        let schema_declared = catalog.children_of(parent.path()).contains(&name);
        if removed.included && schema_declared {
            parent.insert_unused(BlockNode::instantiate(catalog, parent.path(), &name));
        }

        Ok(Applied::structure(path, path))
    }

    fn apply_rename(
        root: &mut BlockNode,
        path: &str,
        new_name: &str,
    ) -> Result<Applied, MutationError> {
        let (parent_path, name) = split_child_path(path)?;
        let parent = root
            .find_mut(&parent_path)
            .ok_or_else(|| MutationError::ParentNotFound(parent_path.clone()))?;
        parent.rename_child(&name, new_name);
        let new_path = hitedit_parser::join_path(&parent_path, new_name);

        Ok(Applied::structure(path, new_path))
    }

    /// Validate without applying
    pub fn validate(&self, root: &BlockNode) -> Result<(), MutationError> {
        match self {
            Mutation::AddChild {
                parent_path,
                name,
                subtype,
            } => {
                let parent = root
                    .find(parent_path)
                    .ok_or_else(|| MutationError::ParentNotFound(parent_path.clone()))?;

                if let Some(name) = name {
                    check_name(name)?;
                    if let Some(unused) = parent.unused_child(name) {
                        return match subtype {
                            Some(subtype) if !unused.has_subtype(subtype) => {
                                Err(MutationError::UnknownSubtype {
                                    path: unused.path().to_string(),
                                    subtype: subtype.clone(),
                                })
                            }
                            _ => Ok(()),
                        };
                    }
                }

                let wildcard = parent.wildcard_child_schema();
                if wildcard.is_none() && parent.is_schema_known() {
                    return Err(MutationError::NoWildcardSchema(parent_path.clone()));
                }
                if let Some(subtype) = subtype {
                    if !wildcard.is_some_and(|w| w.subtype(subtype).is_some()) {
                        return Err(MutationError::UnknownSubtype {
                            path: parent_path.clone(),
                            subtype: subtype.clone(),
                        });
                    }
                }
                Ok(())
            }

            Mutation::Remove { path } => {
                let (parent_path, name) = split_child_path(path)?;
                let parent = root
                    .find(&parent_path)
                    .ok_or_else(|| MutationError::ParentNotFound(parent_path.clone()))?;
                if parent.has_child_named(&name) {
                    Ok(())
                } else {
                    Err(MutationError::NodeNotFound(path.clone()))
                }
            }

            Mutation::Rename { path, new_name } => {
                let (parent_path, name) = split_child_path(path)?;
                let node = Self::block(root, path)?;
                if !node.user_added {
                    return Err(MutationError::NotUserAdded(path.clone()));
                }
                check_name(new_name)?;
                if *new_name != name {
                    let parent = root
                        .find(&parent_path)
                        .ok_or_else(|| MutationError::ParentNotFound(parent_path.clone()))?;
                    if parent.has_child_named(new_name) {
                        return Err(MutationError::NameCollision {
                            parent: parent_path,
                            name: new_name.clone(),
                        });
                    }
                }
                Ok(())
            }

            Mutation::SetSubtype { path, subtype } => {
                check_subtype(Self::block(root, path)?, subtype)
            }

            Mutation::SetValue {
                path,
                parameter,
                value,
            } => {
                let node = Self::block(root, path)?;
                if is_type_write(node, parameter) {
                    return check_subtype(node, value.as_str().unwrap_or_default());
                }
                let slot = Self::slot(root, path, parameter)?;
                slot.check_value(value.clone())
                    .map(|_| ())
                    .map_err(|e| type_mismatch(path, parameter, e))
            }

            Mutation::SetValueText {
                path,
                parameter,
                text,
            } => {
                let node = Self::block(root, path)?;
                if is_type_write(node, parameter) {
                    return check_subtype(node, text.trim());
                }
                let slot = Self::slot(root, path, parameter)?;
                slot.check_text(text)
                    .map(|_| ())
                    .map_err(|e| type_mismatch(path, parameter, e))
            }

            Mutation::AddParameter { path, name, value } => {
                let node = Self::block(root, path)?;
                check_name(name)?;
                if node.parameter(name).is_some() {
                    return Err(MutationError::DuplicateParameter {
                        path: path.clone(),
                        parameter: name.clone(),
                    });
                }
                ParamValue::from(value.as_str())
                    .check_writable()
                    .map_err(|e| type_mismatch(path, name, e))
            }

            Mutation::SetComment {
                path, parameter, ..
            } => Self::slot(root, path, parameter).map(|_| ()),
        }
    }

    /// Path of the block this mutation addresses
    pub fn target_path(&self) -> &str {
        match self {
            Mutation::AddChild { parent_path, .. } => parent_path,
            Mutation::Remove { path }
            | Mutation::Rename { path, .. }
            | Mutation::SetSubtype { path, .. }
            | Mutation::SetValue { path, .. }
            | Mutation::SetValueText { path, .. }
            | Mutation::AddParameter { path, .. }
            | Mutation::SetComment { path, .. } => path,
        }
    }

    fn block<'a>(root: &'a BlockNode, path: &str) -> Result<&'a BlockNode, MutationError> {
        root.find(path)
            .ok_or_else(|| MutationError::NodeNotFound(path.to_string()))
    }

    fn block_mut<'a>(root: &'a mut BlockNode, path: &str) -> Result<&'a mut BlockNode, MutationError> {
        root.find_mut(path)
            .ok_or_else(|| MutationError::NodeNotFound(path.to_string()))
    }

    fn slot<'a>(
        root: &'a BlockNode,
        path: &str,
        parameter: &str,
    ) -> Result<&'a ParameterSlot, MutationError> {
        Self::block(root, path)?
            .parameter(parameter)
            .ok_or_else(|| MutationError::ParameterNotFound {
                path: path.to_string(),
                parameter: parameter.to_string(),
            })
    }

    fn slot_mut<'a>(
        root: &'a mut BlockNode,
        path: &str,
        parameter: &str,
    ) -> Result<&'a mut ParameterSlot, MutationError> {
        Self::block_mut(root, path)?
            .parameter_mut(parameter)
            .ok_or_else(|| MutationError::ParameterNotFound {
                path: path.to_string(),
                parameter: parameter.to_string(),
            })
    }
}

/// Result of applying a mutation
#[derive(Debug, Clone)]
pub struct MutationResult {
    /// New version number
    pub version: u64,

    /// Path of the affected block after the mutation
    pub path: String,

    /// How block ids moved
    pub id_changes: IdChanges,

    /// Ids whose model should be refreshed
    pub touched: Vec<OpaqueId>,
}

fn type_mismatch(path: &str, parameter: &str, err: impl std::fmt::Display) -> MutationError {
    MutationError::TypeMismatch {
        path: path.to_string(),
        parameter: parameter.to_string(),
        message: err.to_string(),
    }
}

/// `type` on a block with subtypes selects the subtype rather than a value
fn is_type_write(node: &BlockNode, parameter: &str) -> bool {
    parameter == TYPE_PARAM && !node.declared_subtypes().is_empty()
}

fn check_subtype(node: &BlockNode, subtype: &str) -> Result<(), MutationError> {
    if node.has_subtype(subtype) {
        Ok(())
    } else {
        Err(MutationError::UnknownSubtype {
            path: node.path().to_string(),
            subtype: subtype.to_string(),
        })
    }
}

/// `(parent path, name)` of a non-root block path
fn split_child_path(path: &str) -> Result<(String, String), MutationError> {
    let name = split_path(path)
        .last()
        .map(|s| s.to_string())
        .ok_or(MutationError::RootNotEditable)?;
    let parent = parent_path(path).ok_or(MutationError::RootNotEditable)?;
    Ok((parent, name))
}

/// Block and parameter names must survive a round trip as a bare word
fn check_name(name: &str) -> Result<(), MutationError> {
    let valid = !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '[' | ']' | '=' | '#' | '\'' | '"'));
    if valid {
        Ok(())
    } else {
        Err(MutationError::InvalidName(name.to_string()))
    }
}

/// `base` if free, else the first free `base_N`; `New_N` without a base
fn fresh_child_name(parent: &BlockNode, base: Option<&str>) -> String {
    if let Some(base) = base {
        if !parent.has_child_named(base) {
            return base.to_string();
        }
    }
    let base = base.unwrap_or("New");
    let mut index = 0;
    loop {
        let candidate = format!("{}_{}", base, index);
        if !parent.has_child_named(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitedit_parser::parse_untyped;

    #[test]
    fn test_fresh_child_names() {
        let root = parse_untyped("[New_0]\n[]\n[u]\n[]\n").unwrap();
        assert_eq!(fresh_child_name(&root, None), "New_1");
        assert_eq!(fresh_child_name(&root, Some("v")), "v");
        assert_eq!(fresh_child_name(&root, Some("u")), "u_0");
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("diff_1").is_ok());
        for bad in ["", "a b", "a/b", "[x]", "x=y", "#c"] {
            assert_eq!(check_name(bad), Err(MutationError::InvalidName(bad.to_string())));
        }
    }

    #[test]
    fn test_root_is_not_editable() {
        let mut root = parse_untyped("[A]\n[]\n").unwrap();
        let err = Mutation::Remove { path: "/".to_string() }
            .apply(&mut root, &SchemaCatalog::empty())
            .unwrap_err();
        assert_eq!(err, MutationError::RootNotEditable);
    }

    #[test]
    fn test_rejected_mutation_leaves_tree_untouched() {
        let mut root = parse_untyped("[A]\n  x = 1\n[]\n").unwrap();
        let before = root.snapshot();
        let err = Mutation::SetValue {
            path: "/A".to_string(),
            parameter: "x".to_string(),
            value: ParamValue::from(3i64),
        }
        .apply(&mut root, &SchemaCatalog::empty())
        .unwrap_err();
        assert!(matches!(err, MutationError::TypeMismatch { .. }));
        assert_eq!(root.snapshot(), before);
    }

    #[test]
    fn test_mutation_serde_shape() {
        let mutation = Mutation::SetValueText {
            path: "/Mesh".to_string(),
            parameter: "dim".to_string(),
            text: "2".to_string(),
        };
        let json = serde_json::to_string(&mutation).unwrap();
        assert!(json.starts_with(r#"{"SetValueText":"#));
        let back: Mutation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mutation);
    }
}
