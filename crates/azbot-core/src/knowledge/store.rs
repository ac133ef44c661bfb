//! Immutable team knowledge base plus its ordered keyword table.
//!
//! Both are authored in a single JSON document:
//!
//! ```json
//! {
//!   "knowledge": { "TeamOverview": { "Location": "Sterling, Virginia" } },
//!   "keywords": [ { "trigger": "based", "path": "TeamOverview.Location" } ]
//! }
//! ```
//!
//! Key order is kept exactly as written (serde_json `preserve_order`), since
//! both resolver passes are first-match.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::KnowledgeError;

/// Knowledge document compiled into the binary (team 12096 Absolute Zero).
pub const BUILTIN_DOCUMENT: &str = include_str!("absolute_zero.json");

/// One `trigger -> path` line of the keyword table as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordBinding {
    pub trigger: String,
    /// Dot-separated key path into the knowledge tree, e.g. `Chassis.LiftSystem`.
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct KnowledgeDocument {
    knowledge: Value,
    #[serde(default)]
    keywords: Vec<KeywordBinding>,
}

/// A trigger phrase bound to the sub-tree it selects.
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    trigger: String,
    path: String,
    section: Value,
}

impl KeywordEntry {
    /// Lower-cased trigger phrase.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn section(&self) -> &Value {
        &self.section
    }
}

/// Trigger phrases in declaration order.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose trigger occurs in `lowered_query`. Later, possibly more
    /// specific, triggers are never considered once one matches.
    pub fn first_match(&self, lowered_query: &str) -> Option<&KeywordEntry> {
        self.entries
            .iter()
            .find(|e| lowered_query.contains(e.trigger.as_str()))
    }
}

/// Read-only knowledge tree shared by every request.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: Value,
    keywords: KeywordTable,
}

impl KnowledgeBase {
    /// The built-in team document.
    pub fn builtin() -> Result<Self, KnowledgeError> {
        Self::from_json_str(BUILTIN_DOCUMENT)
    }

    /// Loads a knowledge document from disk.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, KnowledgeError> {
        let doc: KnowledgeDocument = serde_json::from_str(raw)?;
        Self::from_parts(doc.knowledge, doc.keywords)
    }

    /// Builds the base and resolves every keyword path against it.
    pub fn from_parts(root: Value, bindings: Vec<KeywordBinding>) -> Result<Self, KnowledgeError> {
        if !root.is_object() {
            return Err(KnowledgeError::RootNotObject);
        }

        let mut entries = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let trigger = binding.trigger.trim().to_lowercase();
            if trigger.is_empty() {
                return Err(KnowledgeError::EmptyTrigger { path: binding.path });
            }
            let section = lookup_path(&root, &binding.path)
                .cloned()
                .ok_or_else(|| KnowledgeError::UnknownPath {
                    trigger: trigger.clone(),
                    path: binding.path.clone(),
                })?;
            entries.push(KeywordEntry {
                trigger,
                path: binding.path,
                section,
            });
        }

        tracing::debug!(
            target: "azbot::knowledge",
            sections = root.as_object().map(|m| m.len()).unwrap_or(0),
            keywords = entries.len(),
            "Knowledge base loaded"
        );

        Ok(Self {
            root,
            keywords: KeywordTable { entries },
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Top-level section names in document order.
    pub fn section_names(&self) -> Vec<&str> {
        self.root
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Value at a dot-separated key path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.root, path)
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, key| node.as_object().and_then(|m| m.get(key)))
}
