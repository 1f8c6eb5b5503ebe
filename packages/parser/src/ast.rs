//! # Block Tree
//!
//! The document is a tree of [`BlockNode`]s, each owning its children and
//! its [`ParameterSlot`]s. Nodes never point at their parent; every node
//! stores its root-relative `path` instead, and parents are found by
//! walking down from the root.
//!
//! ## Invariants
//!
//! - a child's path is `parent.path + "/" + name` (`/name` under the root);
//!   [`BlockNode::rebase`] rewrites a whole subtree at once
//! - `active_subtype`, when set, names one of the schema's subtypes
//! - excluded (`included = false`) nodes live only in the parent's unused
//!   list and are never visited by [`BlockNode::children`]

use crate::error::ParseError;
use crate::schema::{join_path, BlockSchema, ParameterSchema, SchemaCatalog, SubtypeSchema};
use crate::value::{ParamValue, Scalar, ValueError, ValueType};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parameter that selects a block's subtype
pub const TYPE_PARAM: &str = "type";

/// Reserved name of a free-form literal value parameter
pub const VALUE_PARAM: &str = "value";

/// One typed, named value inside a block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSlot {
    pub name: String,
    pub declared_type: ValueType,
    pub cpp_type: String,
    pub required: bool,
    pub default_value: Option<ParamValue>,
    current_value: Option<ParamValue>,
    pub user_added: bool,
    pub group: String,
    pub description: String,
    pub allowed_options: Vec<String>,
    pub comments: String,
    pub explicitly_set: bool,
}

impl ParameterSlot {
    pub fn from_schema(schema: &ParameterSchema) -> Self {
        let default_value = schema.default_value();
        Self {
            name: schema.name.clone(),
            declared_type: schema.value_type(),
            cpp_type: schema.cpp_type.clone(),
            required: schema.required,
            current_value: default_value.clone(),
            default_value,
            user_added: false,
            group: schema.group.clone(),
            description: schema.description.clone(),
            allowed_options: schema.options.clone(),
            comments: String::new(),
            explicitly_set: false,
        }
    }

    /// Ad hoc string parameter not described by the schema
    pub fn user(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: ValueType::STRING,
            cpp_type: String::new(),
            required: false,
            default_value: None,
            current_value: Some(ParamValue::from(value.into())),
            user_added: true,
            group: "Main".to_string(),
            description: String::new(),
            allowed_options: Vec::new(),
            comments: String::new(),
            explicitly_set: true,
        }
    }

    /// String parameter of a block the schema does not describe
    pub fn untyped(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            user_added: false,
            ..Self::user(name, value)
        }
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.current_value.as_ref()
    }

    /// Value accepted by [`set_value`](Self::set_value): conformed to the
    /// declared type and writable as document text
    pub fn check_value(&self, value: ParamValue) -> Result<ParamValue, ValueError> {
        let value = value.conform_to(self.declared_type)?;
        value.check_writable()?;
        Ok(value)
    }

    /// [`check_value`](Self::check_value) for editor-supplied text
    pub fn check_text(&self, text: &str) -> Result<ParamValue, ValueError> {
        self.check_value(self.declared_type.parse_text(text)?)
    }

    /// Type-checked assignment; on error nothing changes
    pub fn set_value(&mut self, value: ParamValue) -> Result<(), ValueError> {
        let value = self.check_value(value)?;
        self.current_value = Some(value);
        self.explicitly_set = true;
        Ok(())
    }

    /// Assign from unquoted document text
    pub fn set_text(&mut self, text: &str) -> Result<(), ValueError> {
        let value = self.declared_type.parse_text(text)?;
        self.current_value = Some(value);
        self.explicitly_set = true;
        Ok(())
    }

    /// Keep the raw text when it does not fit the declared type
    pub(crate) fn relax_to_text(&mut self, text: &str) {
        self.declared_type = self.declared_type.relaxed();
        self.current_value = self.declared_type.parse_text(text).ok();
        self.explicitly_set = true;
    }

    pub(crate) fn copy_state_from(&mut self, other: &ParameterSlot) {
        self.current_value = other.current_value.clone();
        self.explicitly_set = other.explicitly_set;
        self.comments = other.comments.clone();
    }

    pub fn has_changed(&self) -> bool {
        self.current_value != self.default_value || !self.comments.is_empty()
    }

    /// Whether the serializer writes this slot
    pub fn should_write(&self) -> bool {
        self.explicitly_set || self.user_added || self.has_changed()
    }

    /// Single-quote rule for serialized values
    pub fn needs_quotes(&self) -> bool {
        let free_form_value = (self.cpp_type.contains("basic_string")
            || self.cpp_type.contains("std::string"))
            && self.name == VALUE_PARAM;

        self.declared_type.is_array()
            || self.user_added
            || free_form_value
            || self.cpp_type == "FunctionExpression"
            || matches!(
                &self.current_value,
                Some(ParamValue::Scalar(Scalar::String(s)))
                    if s.chars().any(|c| c.is_whitespace() || c == ';' || c == '=')
            )
            || matches!(
                &self.current_value,
                Some(ParamValue::Scalar(Scalar::String(s)))
                    if s.starts_with(['[', ']', '#']) || s.contains(['\'', '"'])
            )
    }

    /// Value text as written to the document, quoted when required
    pub fn input_file_value(&self) -> String {
        let text = self
            .current_value
            .as_ref()
            .map(ParamValue::to_text)
            .unwrap_or_default();

        if self.needs_quotes() && (!text.is_empty() || self.user_added) {
            if text.contains('\'') {
                format!("\"{}\"", text)
            } else {
                format!("'{}'", text)
            }
        } else {
            text
        }
    }
}

/// Snapshot of one block used for structural comparison
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSnapshot {
    pub subtype: Option<String>,
    pub values: BTreeMap<String, Option<ParamValue>>,
    pub comments: BTreeMap<String, String>,
}

/// One node of the document tree
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub name: String,
    path: String,
    /// The block's own (non-subtype) parameters
    pub parameters: IndexMap<String, ParameterSlot>,
    children: IndexMap<String, BlockNode>,
    unused_children: IndexMap<String, BlockNode>,
    schema: Option<Arc<BlockSchema>>,
    wildcard_child_schema: Option<Arc<BlockSchema>>,
    active_subtype: Option<String>,
    /// Live parameters of the active subtype
    subtype_parameters: IndexMap<String, ParameterSlot>,
    /// Previously materialized subtypes, kept so switching back restores them
    stashed_subtypes: IndexMap<String, IndexMap<String, ParameterSlot>>,
    pub included: bool,
    pub user_added: bool,
    /// Trailing comment on the block header
    pub comments: String,
    /// Recoverable problems found while loading this block
    pub warnings: Vec<ParseError>,
}

impl BlockNode {
    pub fn root() -> Self {
        Self::new("", "/", None, None)
    }

    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        schema: Option<Arc<BlockSchema>>,
        wildcard_child_schema: Option<Arc<BlockSchema>>,
    ) -> Self {
        let mut parameters: IndexMap<String, ParameterSlot> = schema
            .iter()
            .flat_map(|s| s.parameters.iter())
            .map(|p| (p.name.clone(), ParameterSlot::from_schema(p)))
            .collect();

        if let Some(schema) = &schema {
            if !schema.subtypes.is_empty() && !parameters.contains_key(TYPE_PARAM) {
                let names: Vec<&str> = schema.subtypes.keys().map(String::as_str).collect();
                let slot = ParameterSlot::from_schema(
                    &ParameterSchema::new(TYPE_PARAM, "String").with_options(&names),
                );
                parameters.shift_insert(0, TYPE_PARAM.to_string(), slot);
            }
        }

        Self {
            name: name.into(),
            path: path.into(),
            parameters,
            children: IndexMap::new(),
            unused_children: IndexMap::new(),
            schema,
            wildcard_child_schema,
            active_subtype: None,
            subtype_parameters: IndexMap::new(),
            stashed_subtypes: IndexMap::new(),
            included: true,
            user_added: false,
            comments: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Build a node for `parent_path/name` from the catalog, with one unused
    /// placeholder per schema-declared child.
    pub fn instantiate(catalog: &SchemaCatalog, parent_path: &str, name: &str) -> Self {
        let path = join_path(parent_path, name);
        let mut node = Self::new(
            name,
            path.clone(),
            catalog.lookup(&path).cloned(),
            catalog.wildcard_for(&path).cloned(),
        );
        for child in catalog.children_of(&path) {
            let mut placeholder = Self::instantiate(catalog, &path, &child);
            placeholder.included = false;
            node.unused_children.insert(child, placeholder);
        }
        node
    }

    /// Root with every top-level schema block as an unused placeholder
    pub fn instantiate_root(catalog: &SchemaCatalog) -> Self {
        let mut root = Self::root();
        for child in catalog.children_of("/") {
            let mut placeholder = Self::instantiate(catalog, "/", &child);
            placeholder.included = false;
            root.unused_children.insert(child, placeholder);
        }
        root
    }

    /// Node built from a wildcard schema, optionally already typed
    pub fn from_wildcard(
        wildcard: Arc<BlockSchema>,
        parent_path: &str,
        name: &str,
        subtype: Option<&str>,
    ) -> Self {
        let mut node = Self::new(name, join_path(parent_path, name), Some(wildcard), None);
        if let Some(subtype) = subtype {
            node.switch_subtype(subtype);
        }
        node
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    pub fn schema(&self) -> Option<&Arc<BlockSchema>> {
        self.schema.as_ref()
    }

    /// Whether the catalog knew this block (unknown blocks are permissive leaves)
    pub fn is_schema_known(&self) -> bool {
        self.schema.is_some()
    }

    pub fn wildcard_child_schema(&self) -> Option<&Arc<BlockSchema>> {
        self.wildcard_child_schema.as_ref()
    }

    pub fn declared_subtypes(&self) -> Vec<&str> {
        self.schema
            .iter()
            .flat_map(|s| s.subtypes.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn has_subtype(&self, name: &str) -> bool {
        self.subtype_schema(name).is_some()
    }

    fn subtype_schema(&self, name: &str) -> Option<&SubtypeSchema> {
        self.schema.as_ref().and_then(|s| s.subtype(name))
    }

    pub fn active_subtype(&self) -> Option<&str> {
        self.active_subtype.as_deref()
    }

    /// Path of the active subtype, `path/Type`, used for identity keys
    pub fn active_subtype_path(&self) -> Option<String> {
        self.active_subtype
            .as_deref()
            .map(|subtype| join_path(&self.path, subtype))
    }

    // ---- children ----

    /// Included children in document order
    pub fn children(&self) -> impl Iterator<Item = &BlockNode> {
        self.children.values()
    }

    pub fn unused_children(&self) -> impl Iterator<Item = &BlockNode> {
        self.unused_children.values()
    }

    pub fn child(&self, name: &str) -> Option<&BlockNode> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut BlockNode> {
        self.children.get_mut(name)
    }

    pub fn unused_child(&self, name: &str) -> Option<&BlockNode> {
        self.unused_children.get(name)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether `name` is taken by an included or unused child
    pub fn has_child_named(&self, name: &str) -> bool {
        self.children.contains_key(name) || self.unused_children.contains_key(name)
    }

    /// Attach `node` as an included child, rewriting its subtree paths
    pub fn insert_child(&mut self, mut node: BlockNode) {
        node.included = true;
        node.rebase(&self.path);
        self.unused_children.shift_remove(&node.name);
        self.children.insert(node.name.clone(), node);
    }

    /// Attach `node` to the unused side list
    pub fn insert_unused(&mut self, mut node: BlockNode) {
        node.included = false;
        node.rebase(&self.path);
        self.unused_children.insert(node.name.clone(), node);
    }

    /// Move an unused child into the live tree
    pub fn include_child(&mut self, name: &str) -> bool {
        match self.unused_children.shift_remove(name) {
            Some(mut node) => {
                node.included = true;
                self.children.insert(name.to_string(), node);
                true
            }
            None => false,
        }
    }

    /// Detach a child from either list
    pub fn take_child(&mut self, name: &str) -> Option<BlockNode> {
        self.children
            .shift_remove(name)
            .or_else(|| self.unused_children.shift_remove(name))
    }

    /// Rename an included child in place, keeping its position
    pub fn rename_child(&mut self, old: &str, new: &str) -> bool {
        let Some((index, _, mut node)) = self.children.shift_remove_full(old) else {
            return false;
        };
        node.name = new.to_string();
        node.rebase(&self.path);
        self.children.shift_insert(index, new.to_string(), node);
        true
    }

    /// Recompute this node's path under `parent_path`, then the whole subtree
    pub fn rebase(&mut self, parent_path: &str) {
        self.path = join_path(parent_path, &self.name);
        let path = self.path.clone();
        for child in self
            .children
            .values_mut()
            .chain(self.unused_children.values_mut())
        {
            child.rebase(&path);
        }
    }

    // ---- traversal ----

    /// Included node at `path`
    pub fn find(&self, path: &str) -> Option<&BlockNode> {
        let relative = self.relative_segments(path)?;
        relative
            .iter()
            .try_fold(self, |node, segment| node.children.get(*segment))
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut BlockNode> {
        let relative: Vec<String> = self
            .relative_segments(path)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut node = self;
        for segment in &relative {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    fn relative_segments<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let own = crate::schema::split_path(&self.path);
        let target = crate::schema::split_path(path);
        if target.len() < own.len() || target[..own.len()] != own[..] {
            return None;
        }
        Some(target[own.len()..].to_vec())
    }

    /// This node and every included descendant, pre-order
    pub fn descendants(&self) -> Vec<&BlockNode> {
        let mut out = vec![self];
        for child in self.children.values() {
            out.extend(child.descendants());
        }
        out
    }

    /// Paths of every included block below (and not including) this node
    pub fn paths(&self) -> Vec<String> {
        self.descendants()
            .into_iter()
            .skip(1)
            .map(|node| node.path.clone())
            .collect()
    }

    // ---- parameters ----

    /// Own parameter or active-subtype parameter
    pub fn parameter(&self, name: &str) -> Option<&ParameterSlot> {
        self.parameters
            .get(name)
            .or_else(|| self.subtype_parameters.get(name))
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut ParameterSlot> {
        match self.parameters.get_mut(name) {
            Some(slot) => Some(slot),
            None => self.subtype_parameters.get_mut(name),
        }
    }

    pub fn subtype_parameters(&self) -> impl Iterator<Item = &ParameterSlot> {
        self.subtype_parameters.values()
    }

    /// Own parameters followed by the active subtype's
    pub fn all_parameters(&self) -> impl Iterator<Item = &ParameterSlot> {
        self.parameters
            .values()
            .chain(self.subtype_parameters.values())
    }

    pub fn add_user_parameter(&mut self, slot: ParameterSlot) {
        self.parameters.insert(slot.name.clone(), slot);
    }

    // ---- subtypes ----

    /// Switch the active subtype. Values of parameters that exist in both
    /// subtypes with the same declared type are carried over; the old
    /// subtype's slots are stashed. Returns false for an unknown subtype.
    pub fn switch_subtype(&mut self, new_type: &str) -> bool {
        let Some(subtype_schema) = self.subtype_schema(new_type).cloned() else {
            return false;
        };
        if self.active_subtype.as_deref() == Some(new_type) {
            return true;
        }

        let mut incoming = self
            .stashed_subtypes
            .shift_remove(new_type)
            .unwrap_or_else(|| self.materialize_subtype(&subtype_schema));

        for slot in incoming.values_mut() {
            if let Some(old) = self.subtype_parameters.get(&slot.name) {
                if old.declared_type == slot.declared_type {
                    slot.copy_state_from(old);
                }
            }
        }

        let outgoing = std::mem::replace(&mut self.subtype_parameters, incoming);
        if let Some(old_type) = self.active_subtype.take() {
            self.stashed_subtypes.insert(old_type, outgoing);
        }
        self.active_subtype = Some(new_type.to_string());

        if let Some(type_slot) = self.parameters.get_mut(TYPE_PARAM) {
            if type_slot.set_value(ParamValue::from(new_type)).is_err() {
                type_slot.relax_to_text(new_type);
            }
        }
        true
    }

    /// Drop the active subtype, keeping its slots stashed
    pub fn clear_subtype(&mut self) {
        if let Some(old_type) = self.active_subtype.take() {
            let outgoing = std::mem::take(&mut self.subtype_parameters);
            self.stashed_subtypes.insert(old_type, outgoing);
        }
    }

    fn materialize_subtype(&self, schema: &SubtypeSchema) -> IndexMap<String, ParameterSlot> {
        schema
            .parameters
            .iter()
            .filter(|p| !self.parameters.contains_key(&p.name))
            .map(|p| (p.name.clone(), ParameterSlot::from_schema(p)))
            .collect()
    }

    // ---- whole-tree helpers ----

    /// Replace everything but this node's name and path with `other`'s
    /// contents. Used to swap in a reparsed tree under a stable root.
    pub fn replace_contents(&mut self, other: BlockNode) {
        let BlockNode {
            parameters,
            mut children,
            mut unused_children,
            schema,
            wildcard_child_schema,
            active_subtype,
            subtype_parameters,
            stashed_subtypes,
            included,
            user_added,
            comments,
            warnings,
            ..
        } = other;

        for child in children.values_mut().chain(unused_children.values_mut()) {
            child.rebase(&self.path);
        }

        self.parameters = parameters;
        self.children = children;
        self.unused_children = unused_children;
        self.schema = schema;
        self.wildcard_child_schema = wildcard_child_schema;
        self.active_subtype = active_subtype;
        self.subtype_parameters = subtype_parameters;
        self.stashed_subtypes = stashed_subtypes;
        self.included = included;
        self.user_added = user_added;
        self.comments = comments;
        self.warnings = warnings;
    }

    /// Path-keyed snapshot of the included tree: subtypes, values, comments
    pub fn snapshot(&self) -> BTreeMap<String, BlockSnapshot> {
        self.descendants()
            .into_iter()
            .map(|node| {
                let values = node
                    .all_parameters()
                    .map(|p| (p.name.clone(), p.value().cloned()))
                    .collect();
                let comments = node
                    .all_parameters()
                    .filter(|p| !p.comments.is_empty())
                    .map(|p| (p.name.clone(), p.comments.clone()))
                    .collect();
                (
                    node.path.clone(),
                    BlockSnapshot {
                        subtype: node.active_subtype.clone(),
                        values,
                        comments,
                    },
                )
            })
            .collect()
    }

    pub fn structurally_eq(&self, other: &BlockNode) -> bool {
        self.snapshot() == other.snapshot()
    }

    /// Warnings attached anywhere in the included tree
    pub fn diagnostics(&self) -> Vec<&ParseError> {
        self.descendants()
            .into_iter()
            .flat_map(|node| node.warnings.iter())
            .collect()
    }
}
