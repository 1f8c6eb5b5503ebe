//! # Block Identity
//!
//! External views (a property-editor proxy store, a UI tree) address a block
//! by an [`OpaqueId`] built from its path and active subtype path. The id is
//! a pure function of that pair, so re-deriving it after a rename needs no
//! counter or lookup. The [`IdentityMapper`] keeps the current id table for
//! one document and reports how ids move when the tree changes.

use hitedit_parser::BlockNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

pub const ID_SEPARATOR: &str = "::";

/// Stable address of one block + subtype combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueId(String);

impl OpaqueId {
    pub fn new(path: &str, subtype_path: Option<&str>) -> Self {
        Self(format!(
            "{}{}{}",
            path,
            ID_SEPARATOR,
            subtype_path.unwrap_or_default()
        ))
    }

    pub fn for_block(node: &BlockNode) -> Self {
        Self::new(node.path(), node.active_subtype_path().as_deref())
    }

    /// Accept an id string received from an external view
    pub fn parse(raw: &str) -> Option<Self> {
        raw.contains(ID_SEPARATOR).then(|| Self(raw.to_string()))
    }

    pub fn path(&self) -> &str {
        self.0
            .split_once(ID_SEPARATOR)
            .map(|(path, _)| path)
            .unwrap_or(&self.0)
    }

    pub fn subtype_path(&self) -> Option<&str> {
        self.0
            .split_once(ID_SEPARATOR)
            .map(|(_, subtype)| subtype)
            .filter(|subtype| !subtype.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How ids moved after a structural change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdChanges {
    /// `(old, new)` pairs for blocks that survived under a new id
    pub remapped: Vec<(OpaqueId, OpaqueId)>,
    pub added: Vec<OpaqueId>,
    pub removed: Vec<OpaqueId>,
}

impl IdChanges {
    pub fn is_empty(&self) -> bool {
        self.remapped.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Every id a subscriber should refresh: old and new sides of remaps,
    /// additions, and removals
    pub fn affected(&self) -> Vec<OpaqueId> {
        let mut ids: Vec<OpaqueId> = Vec::new();
        for (old, new) in &self.remapped {
            ids.push(old.clone());
            ids.push(new.clone());
        }
        ids.extend(self.added.iter().cloned());
        ids.extend(self.removed.iter().cloned());
        ids
    }

    /// New id for `id` if it was remapped
    pub fn remap_of(&self, id: &OpaqueId) -> Option<&OpaqueId> {
        self.remapped
            .iter()
            .find(|(old, _)| old == id)
            .map(|(_, new)| new)
    }

    pub fn was_removed(&self, id: &OpaqueId) -> bool {
        self.removed.contains(id)
    }
}

/// Outcome of re-resolving an id against a freshly parsed tree
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The path still exists
    Exact(OpaqueId),
    /// The path vanished; closest surviving path by string similarity.
    /// A hint only, it may point at an unrelated block.
    Nearest { id: OpaqueId, score: f64 },
    /// The new tree has no blocks
    None,
}

impl Resolution {
    pub fn id(&self) -> Option<&OpaqueId> {
        match self {
            Resolution::Exact(id) | Resolution::Nearest { id, .. } => Some(id),
            Resolution::None => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Resolution::Exact(_))
    }
}

/// Bidirectional `OpaqueId <-> path` table for one document
#[derive(Debug, Clone, Default)]
pub struct IdentityMapper {
    by_id: BTreeMap<OpaqueId, String>,
    by_path: BTreeMap<String, OpaqueId>,
}

impl IdentityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table from an included tree. The root is not addressable.
    pub fn register_tree(&mut self, root: &BlockNode) -> Vec<OpaqueId> {
        self.by_id.clear();
        self.by_path.clear();
        for node in root.descendants().into_iter().filter(|n| !n.is_root()) {
            self.insert(node);
        }
        self.by_id.keys().cloned().collect()
    }

    pub fn id_for(&self, path: &str) -> Option<&OpaqueId> {
        self.by_path.get(path)
    }

    pub fn resolve(&self, id: &OpaqueId) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &OpaqueId> {
        self.by_id.keys()
    }

    /// Re-derive ids for the subtree that lived at `old_path` and now lives
    /// at `new_path` (equal for an in-place retype, absent in `root` after a
    /// removal, absent in the table before an addition). Descendants are
    /// matched by their path relative to the subtree root.
    pub fn subtree_changed(&mut self, root: &BlockNode, old_path: &str, new_path: &str) -> IdChanges {
        let mut previous: BTreeMap<String, OpaqueId> = BTreeMap::new();
        let stale: Vec<String> = self
            .by_path
            .keys()
            .filter(|path| is_within(path, old_path))
            .cloned()
            .collect();
        for path in stale {
            if let Some(id) = self.by_path.remove(&path) {
                self.by_id.remove(&id);
                previous.insert(path[old_path.len()..].to_string(), id);
            }
        }

        let mut changes = IdChanges::default();
        if let Some(subtree) = root.find(new_path) {
            for node in subtree.descendants() {
                let id = self.insert(node);
                match previous.remove(&node.path()[new_path.len()..]) {
                    Some(old) if old != id => changes.remapped.push((old, id)),
                    Some(_) => {}
                    None => changes.added.push(id),
                }
            }
        }
        changes.removed = previous.into_values().collect();

        debug!(
            old_path = %old_path,
            new_path = %new_path,
            remapped = changes.remapped.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            "Identity table updated"
        );
        changes
    }

    /// Find `previous` in a freshly parsed tree: exact path first, then the
    /// most similar surviving path anywhere in the tree.
    pub fn resolve_after_reparse(&self, root: &BlockNode, previous: &OpaqueId) -> Resolution {
        if let Some(node) = root.find(previous.path()).filter(|n| !n.is_root()) {
            return Resolution::Exact(OpaqueId::for_block(node));
        }

        let mut best: Option<(f64, &BlockNode)> = None;
        for node in root.descendants().into_iter().filter(|n| !n.is_root()) {
            let score = similarity(previous.path(), node.path());
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, node));
            }
        }

        match best {
            Some((score, node)) => {
                let id = OpaqueId::for_block(node);
                warn!(previous = %previous, nearest = %id, score, "No exact identity match, using nearest block");
                Resolution::Nearest { id, score }
            }
            None => Resolution::None,
        }
    }

    fn insert(&mut self, node: &BlockNode) -> OpaqueId {
        let id = OpaqueId::for_block(node);
        self.by_id.insert(id.clone(), node.path().to_string());
        self.by_path.insert(node.path().to_string(), id.clone());
        id
    }
}

fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}

/// Normalized edit similarity in `[0, 1]`
fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}
