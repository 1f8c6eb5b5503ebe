//! # Document Handle
//!
//! A Document is one open input file: the root block, the schema it was
//! loaded against, and the id table external views address it by.
//!
//! Documents can be:
//! - **Memory-backed**: built from text, for tests and embedding
//! - **File-backed**: opened from disk and written back with [`Document::write`]
//!
//! ## Lifecycle
//!
//! ```text
//! Open → Parse → Edit → Serialize → Write
//!   ↓      ↓       ↓        ↓         ↓
//! File   Tree  Mutations   Text      File
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use hitedit_parser::{parse, BlockNode, ParseError, SchemaCatalog, Serializer};
use tracing::debug;

use crate::identity::{IdChanges, IdentityMapper, OpaqueId};
use crate::{EditorError, Mutation, MutationResult};

/// Editable block document
#[derive(Debug)]
pub struct Document {
    /// Path to source file (if any)
    pub path: PathBuf,

    /// Current version number (increments on each applied change)
    pub version: u64,

    /// Backing storage strategy
    storage: DocumentStorage,

    root: BlockNode,
    schema: Arc<SchemaCatalog>,
    identity: IdentityMapper,
}

/// Storage backend for document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStorage {
    /// In-memory only
    Memory { dirty: bool },

    /// File-backed
    File { dirty: bool },
}

impl Document {
    /// Empty memory-backed document with every top-level schema block unused
    pub fn new(path: PathBuf, schema: Arc<SchemaCatalog>) -> Self {
        let root = BlockNode::instantiate_root(&schema);
        Self::with_root(path, root, schema, DocumentStorage::Memory { dirty: false })
    }

    /// Create document from source text (memory-backed)
    pub fn from_source(
        path: PathBuf,
        source: &str,
        schema: Arc<SchemaCatalog>,
    ) -> Result<Self, EditorError> {
        let root = parse(source, &schema)?;
        Ok(Self::with_root(path, root, schema, DocumentStorage::Memory { dirty: false }))
    }

    /// Open a document from disk (file-backed)
    pub fn open(path: PathBuf, schema: Arc<SchemaCatalog>) -> Result<Self, EditorError> {
        let source = std::fs::read_to_string(&path)?;
        let root = parse(&source, &schema)?;
        debug!(path = %path.display(), blocks = root.paths().len(), "Opened document");
        Ok(Self::with_root(path, root, schema, DocumentStorage::File { dirty: false }))
    }

    fn with_root(
        path: PathBuf,
        root: BlockNode,
        schema: Arc<SchemaCatalog>,
        storage: DocumentStorage,
    ) -> Self {
        let mut identity = IdentityMapper::new();
        identity.register_tree(&root);
        Self {
            path,
            version: 0,
            storage,
            root,
            schema,
            identity,
        }
    }

    pub fn root(&self) -> &BlockNode {
        &self.root
    }

    pub fn schema(&self) -> &Arc<SchemaCatalog> {
        &self.schema
    }

    pub fn identity(&self) -> &IdentityMapper {
        &self.identity
    }

    pub fn storage(&self) -> DocumentStorage {
        self.storage
    }

    /// Recoverable problems found while loading
    pub fn diagnostics(&self) -> Vec<&ParseError> {
        self.root.diagnostics()
    }

    /// Apply a mutation. Rejected mutations change nothing, not even the version.
    pub fn apply(&mut self, mutation: Mutation) -> Result<MutationResult, EditorError> {
        let applied = mutation.apply(&mut self.root, &self.schema)?;
        self.version += 1;
        self.mark_dirty();

        let (id_changes, touched) = if applied.structural {
            let changes = self
                .identity
                .subtree_changed(&self.root, &applied.old_path, &applied.path);
            let mut touched = changes.affected();
            touched.extend(self.parent_id(&applied.path));
            (changes, touched)
        } else {
            let touched = self.identity.id_for(&applied.path).cloned().into_iter().collect();
            (IdChanges::default(), touched)
        };

        debug!(
            version = self.version,
            path = %applied.path,
            mutation = ?mutation,
            "Applied mutation"
        );

        Ok(MutationResult {
            version: self.version,
            path: applied.path,
            id_changes,
            touched,
        })
    }

    /// Replace the tree's contents with a parse of `source`, keeping the
    /// root itself. On a parse error nothing changes. Returns every id of
    /// the new tree.
    pub fn replace_from_text(&mut self, source: &str) -> Result<Vec<OpaqueId>, EditorError> {
        let parsed = parse(source, &self.schema)?;
        self.root.replace_contents(parsed);
        self.version += 1;
        self.mark_dirty();
        Ok(self.identity.register_tree(&self.root))
    }

    /// Serialize to canonical text with two-space indentation
    pub fn save(&self) -> String {
        self.save_with(&mut Serializer::new())
    }

    pub fn save_with(&self, serializer: &mut Serializer) -> String {
        serializer.serialize(&self.root)
    }

    /// Write the document to disk (if file-backed) and return the text written
    pub fn write(&mut self) -> Result<String, EditorError> {
        match self.storage {
            DocumentStorage::File { .. } => {
                let text = self.save();
                std::fs::write(&self.path, &text)?;
                self.storage = DocumentStorage::File { dirty: false };
                Ok(text)
            }
            DocumentStorage::Memory { .. } => Err(EditorError::NotFileBacked),
        }
    }

    /// Check if document has unsaved changes
    pub fn is_dirty(&self) -> bool {
        match self.storage {
            DocumentStorage::Memory { dirty } | DocumentStorage::File { dirty } => dirty,
        }
    }

    fn mark_dirty(&mut self) {
        self.storage = match self.storage {
            DocumentStorage::Memory { .. } => DocumentStorage::Memory { dirty: true },
            DocumentStorage::File { .. } => DocumentStorage::File { dirty: true },
        };
    }

    fn parent_id(&self, path: &str) -> Option<OpaqueId> {
        hitedit_parser::parent_path(path).and_then(|parent| self.identity.id_for(&parent).cloned())
    }
}
