//! # Reconciliation
//!
//! Keeps three views of one document consistent: the block tree, its text,
//! and the structured editor's model (addressed by [`OpaqueId`]s).
//!
//! ```text
//! structured edit ─► apply ─► (debounce) ─► serialize ─► TextChanged
//! text edit ──────► (debounce) ─► parse ─► replace tree ─► ModelChanged
//!                                                       └► ActiveIdChanged
//! ```
//!
//! Each flow has its own [`Debouncer`]; a new event cancels the flow's
//! pending task and restarts its timer. A newer edit in one flow cancels the
//! other flow's pending task, so the most recent edit wins; typed text
//! dropped that way is handed back in [`SyncEvent::TextDiscarded`].
//!
//! Both flows run under the one state lock, so a parse and a structured
//! edit never interleave. `updating_from_text` marks the tree-replacement
//! window inside that lock: `run_serialize` and `apply` refuse to schedule
//! or write text while it is set, and every exit of `run_parse` clears it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hitedit_parser::{SchemaCatalog, Serializer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::identity::OpaqueId;
use crate::{Document, EditorError, Mutation, MutationResult};

const EVENT_CAPACITY: usize = 100;

/// Timing and formatting for a reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between the last structured edit and regenerating text
    pub serialize_delay: Duration,
    /// Delay between the last text edit and reparsing
    pub parse_delay: Duration,
    /// Indentation per nesting level in generated text
    pub indent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            serialize_delay: Duration::from_millis(300),
            parse_delay: Duration::from_millis(500),
            indent: "  ".to_string(),
        }
    }
}

/// Notifications for the text view and the structured editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Regenerated text for the text view
    TextChanged { text: String, version: u64 },
    /// The structured model of these ids must be refreshed
    ModelChanged { ids: Vec<OpaqueId> },
    /// The selected block moved. `exact` is false for a similarity match.
    ActiveIdChanged {
        previous: Option<OpaqueId>,
        current: Option<OpaqueId>,
        exact: bool,
    },
    /// A text edit did not parse; tree and text were kept
    ParseFailed { message: String },
    /// A structured edit superseded this unparsed text edit
    TextDiscarded { text: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub serialize_runs: u64,
    pub parse_runs: u64,
    pub parse_failures: u64,
}

struct SyncState {
    document: Document,
    /// Last text published to or accepted from the text view
    text: String,
    /// Latest text edit waiting for the parse task
    pending_text: Option<String>,
    active_id: Option<OpaqueId>,
    updating_from_text: bool,
    stats: SyncStats,
}

struct Shared {
    state: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    config: SyncConfig,
}

/// Reconciles the block tree with its text and structured views
pub struct ReconciliationEngine {
    shared: Arc<Shared>,
    serialize_task: Debouncer,
    parse_task: Debouncer,
}

impl ReconciliationEngine {
    /// Start from a document; the text view begins with its canonical text
    pub fn new(document: Document, config: SyncConfig) -> Self {
        let text = document.save_with(&mut Serializer::with_indent(&config.indent));
        Self::with_text(document, text, config)
    }

    /// Start from a document and the exact text it was loaded from
    pub fn with_text(document: Document, text: String, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = SyncState {
            document,
            text,
            pending_text: None,
            active_id: None,
            updating_from_text: false,
            stats: SyncStats::default(),
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events,
                config,
            }),
            serialize_task: Debouncer::new(),
            parse_task: Debouncer::new(),
        }
    }

    /// Parse `source` into a memory-backed document, keeping `source` as the text view
    pub fn from_source(
        path: PathBuf,
        source: &str,
        schema: Arc<SchemaCatalog>,
        config: SyncConfig,
    ) -> Result<Self, EditorError> {
        let document = Document::from_source(path, source, schema)?;
        Ok(Self::with_text(document, source.to_string(), config))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Structured edit. Applied immediately; text follows after the
    /// serialize delay. Must be called from within a tokio runtime.
    pub fn apply(&self, mutation: Mutation) -> Result<MutationResult, EditorError> {
        let (result, from_text) = {
            let mut state = self.shared.state.lock();
            let result = state.document.apply(mutation)?;

            if let Some(active) = state.active_id.clone() {
                let moved = match result.id_changes.remap_of(&active) {
                    Some(new) => Some(Some(new.clone())),
                    None if result.id_changes.was_removed(&active) => Some(None),
                    None => None,
                };
                if let Some(current) = moved {
                    state.active_id = current.clone();
                    self.shared.publish(SyncEvent::ActiveIdChanged {
                        previous: Some(active),
                        current,
                        exact: true,
                    });
                }
            }

            self.shared.publish(SyncEvent::ModelChanged {
                ids: result.touched.clone(),
            });
            (result, state.updating_from_text)
        };

        if !from_text {
            if self.parse_task.cancel() {
                debug!("Structured edit supersedes pending text edit");
                let discarded = self.shared.state.lock().pending_text.take();
                if let Some(text) = discarded {
                    self.shared.publish(SyncEvent::TextDiscarded { text });
                }
            }
            let shared = self.shared.clone();
            self.serialize_task
                .schedule(self.shared.config.serialize_delay, move || shared.run_serialize());
        }
        Ok(result)
    }

    /// Text edit from the text view. Text equal to the last published text
    /// is our own echo and is ignored. Returns whether a parse was scheduled.
    /// Must be called from within a tokio runtime.
    pub fn text_edited(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        {
            let mut state = self.shared.state.lock();
            if state.pending_text.is_none() && text == state.text {
                debug!("Ignoring text echo");
                return false;
            }
            state.pending_text = Some(text);
        }

        if self.serialize_task.cancel() {
            debug!("Text edit supersedes pending structured edit");
        }
        let shared = self.shared.clone();
        self.parse_task
            .schedule(self.shared.config.parse_delay, move || shared.run_parse());
        true
    }

    /// Select a block for the structured editor. Unknown ids are rejected.
    pub fn select(&self, id: &OpaqueId) -> bool {
        let mut state = self.shared.state.lock();
        if state.document.identity().resolve(id).is_none() {
            return false;
        }
        let previous = state.active_id.replace(id.clone());
        if previous.as_ref() != Some(id) {
            self.shared.publish(SyncEvent::ActiveIdChanged {
                previous,
                current: Some(id.clone()),
                exact: true,
            });
        }
        true
    }

    pub fn active_id(&self) -> Option<OpaqueId> {
        self.shared.state.lock().active_id.clone()
    }

    /// Last text published to or accepted from the text view
    pub fn text(&self) -> String {
        self.shared.state.lock().text.clone()
    }

    pub fn stats(&self) -> SyncStats {
        self.shared.state.lock().stats
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.shared.state.lock().document)
    }

    /// Whether either flow has a task waiting for its delay
    pub fn is_pending(&self) -> bool {
        self.serialize_task.is_pending() || self.parse_task.is_pending()
    }

    /// Run pending tasks now instead of waiting for their delays
    pub fn flush(&self) {
        if self.parse_task.cancel() {
            self.shared.run_parse();
        }
        if self.serialize_task.cancel() {
            self.shared.run_serialize();
        }
    }
}

impl Shared {
    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn run_serialize(&self) {
        let mut state = self.state.lock();
        if state.updating_from_text {
            return;
        }

        let text = state
            .document
            .save_with(&mut Serializer::with_indent(&self.config.indent));
        state.stats.serialize_runs += 1;

        if text != state.text {
            let version = state.document.version;
            info!(version, bytes = text.len(), "Text regenerated from model");
            state.text = text.clone();
            self.publish(SyncEvent::TextChanged { text, version });
        }
    }

    fn run_parse(&self) {
        let mut state = self.state.lock();
        let Some(text) = state.pending_text.take() else {
            return;
        };

        state.updating_from_text = true;
        state.stats.parse_runs += 1;

        match state.document.replace_from_text(&text) {
            Ok(ids) => {
                state.text = text;
                info!(
                    version = state.document.version,
                    blocks = ids.len(),
                    "Model rebuilt from text"
                );

                let resolved = state.active_id.clone().map(|previous| {
                    let resolution = state
                        .document
                        .identity()
                        .resolve_after_reparse(state.document.root(), &previous);
                    (previous, resolution)
                });

                self.publish(SyncEvent::ModelChanged { ids });

                if let Some((previous, resolution)) = resolved {
                    let current = resolution.id().cloned();
                    let exact = resolution.is_exact();
                    state.active_id = current.clone();
                    if !exact || current.as_ref() != Some(&previous) {
                        self.publish(SyncEvent::ActiveIdChanged {
                            previous: Some(previous),
                            current,
                            exact,
                        });
                    }
                }
            }
            Err(err) => {
                state.stats.parse_failures += 1;
                warn!(%err, "Text edit does not parse, keeping last good tree");
                self.publish(SyncEvent::ParseFailed {
                    message: err.to_string(),
                });
            }
        }

        state.updating_from_text = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(source: &str) -> ReconciliationEngine {
        ReconciliationEngine::from_source(
            PathBuf::from("test.i"),
            source,
            Arc::new(SchemaCatalog::empty()),
            SyncConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.serialize_delay, Duration::from_millis(300));
        assert_eq!(config.parse_delay, Duration::from_millis(500));
        assert_eq!(config.indent, "  ");
    }

    #[test]
    fn test_select_rejects_unknown_ids() {
        let engine = engine("[A]\n[]\n");
        assert!(!engine.select(&OpaqueId::new("/B", None)));
        assert!(engine.select(&OpaqueId::new("/A", None)));
        assert_eq!(engine.active_id(), Some(OpaqueId::new("/A", None)));
    }

    #[tokio::test]
    async fn test_echo_is_ignored() {
        let engine = engine("[A]\n[]\n");
        assert!(!engine.text_edited(engine.text()));
        assert!(!engine.is_pending());
        assert!(engine.text_edited("[B]\n[]\n"));
        assert!(engine.is_pending());
    }

    #[tokio::test]
    async fn test_failed_parse_clears_text_guard() {
        let engine = engine("[A]\n  x = 1\n[]\n");
        engine.text_edited("[A]\n  x = 3\n");
        engine.flush();
        assert_eq!(engine.stats().parse_failures, 1);
        assert!(!engine.shared.state.lock().updating_from_text);

        engine
            .apply(Mutation::SetValueText {
                path: "/A".to_string(),
                parameter: "x".to_string(),
                text: "2".to_string(),
            })
            .unwrap();
        assert!(engine.is_pending());
        engine.flush();
        assert_eq!(engine.stats().serialize_runs, 1);
        assert!(engine.text().contains("x = 2"));
    }

    #[tokio::test]
    async fn test_flush_runs_pending_parse() {
        let engine = engine("[A]\n[]\n");
        engine.text_edited("[B]\n[]\n");
        engine.flush();
        assert!(!engine.is_pending());
        assert_eq!(engine.stats().parse_runs, 1);
        assert_eq!(
            engine.with_document(|doc| doc.root().paths()),
            vec!["/B".to_string()]
        );
    }
}
