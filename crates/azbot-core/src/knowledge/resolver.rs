//! Knowledge resolver: picks the fragment of the knowledge base to put in front of the model.
//!
//! Two passes, in order:
//! 1. keyword pass: first trigger phrase (table order) contained in the query wins;
//! 2. fallback search: depth-first walk of the whole tree, first string or key
//!    containing the query wins.
//!
//! All comparisons are on lower-cased text, keys included.

use serde_json::Value;
use std::fmt;

use super::store::KnowledgeBase;

/// Which pass produced a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Keyword table hit with this trigger phrase.
    Keyword(String),
    /// Fallback recursive search hit.
    Search,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::Keyword(trigger) => write!(f, "keyword:{}", trigger),
            ResolutionSource::Search => f.write_str("search"),
        }
    }
}

/// A resolved knowledge fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub fragment: String,
    pub source: ResolutionSource,
}

impl KnowledgeBase {
    /// Resolves a free-text query to a knowledge fragment, or `None` when neither pass hits.
    pub fn resolve(&self, query: &str) -> Option<Resolution> {
        let lowered = query.to_lowercase();

        let resolution = self
            .keyword_fragment(&lowered)
            .or_else(|| {
                search_value(self.root(), &lowered).map(|fragment| Resolution {
                    fragment,
                    source: ResolutionSource::Search,
                })
            });

        match &resolution {
            Some(r) => tracing::debug!(
                target: "azbot::resolver",
                source = %r.source,
                fragment_len = r.fragment.len(),
                "Query resolved"
            ),
            None => tracing::debug!(target: "azbot::resolver", "No knowledge matched query"),
        }
        resolution
    }

    fn keyword_fragment(&self, lowered: &str) -> Option<Resolution> {
        self.keywords().first_match(lowered).map(|entry| Resolution {
            fragment: render_value(entry.section()),
            source: ResolutionSource::Keyword(entry.trigger().to_string()),
        })
    }
}

/// Pretty JSON with two-space indentation. A string renders quoted, a number as its literal.
pub fn render_value(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Depth-first, first-match search for `needle` (already lower-cased).
///
/// Strings match on content; object keys match as `"key: <rendered value>"`.
/// Numbers, booleans and null never match. Empty hits do not count.
pub fn search_value(value: &Value, needle: &str) -> Option<String> {
    match value {
        Value::String(s) => {
            (!s.is_empty() && s.to_lowercase().contains(needle)).then(|| s.clone())
        }
        Value::Array(items) => items.iter().find_map(|item| search_value(item, needle)),
        Value::Object(map) => {
            for (key, child) in map {
                if key.to_lowercase().contains(needle) {
                    return Some(format!("{}: {}", key, render_value(child)));
                }
                if let Some(hit) = search_value(child, needle) {
                    return Some(hit);
                }
            }
            None
        }
        _ => None,
    }
}
