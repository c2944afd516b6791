//! Dotted key-path projection over info documents
//!
//! `profile.name` selects `info.profile.name`. A numeric segment indexes an
//! array, and the projection keeps only the selected elements in index order,
//! so `emails.1` over `{"emails": ["a", "b", "c"]}` yields `{"emails": ["b"]}`.
//! Several paths are merged into one projection. Paths that do not exist in
//! the document are left out of the result rather than reported.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CertgateError, Result};
use crate::record::InfoDocument;

/// A parsed dotted key path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if raw.is_empty() || segments.iter().any(String::is_empty) {
            return Err(CertgateError::InvalidInput(format!(
                "Invalid key path '{}'",
                raw
            )));
        }
        Ok(Self { segments })
    }

    /// Parse a `keys` query value: paths separated by whitespace or commas.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for KeyPath {
    type Err = CertgateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Project `doc` down to the given key paths.
///
/// With no paths the whole document is returned.
pub fn project(doc: &InfoDocument, paths: &[KeyPath]) -> InfoDocument {
    if paths.is_empty() {
        return doc.clone();
    }

    let mut selection = Selection::default();
    for path in paths {
        selection.insert(path.segments());
    }
    selection.select_object(doc)
}

/// Trie of requested segments
#[derive(Debug, Default)]
struct Selection {
    whole: bool,
    children: BTreeMap<String, Selection>,
}

impl Selection {
    fn insert(&mut self, segments: &[String]) {
        match segments.split_first() {
            None => self.whole = true,
            Some((head, rest)) => self.children.entry(head.clone()).or_default().insert(rest),
        }
    }

    fn select(&self, value: &Value) -> Option<Value> {
        if self.whole {
            return Some(value.clone());
        }
        match value {
            Value::Object(map) => {
                let projected = self.select_object(map);
                (!projected.is_empty()).then_some(Value::Object(projected))
            }
            Value::Array(items) => {
                let mut picked: Vec<(usize, Value)> = self
                    .children
                    .iter()
                    .filter_map(|(key, child)| {
                        let index = parse_index(key)?;
                        let selected = child.select(items.get(index)?)?;
                        Some((index, selected))
                    })
                    .collect();
                if picked.is_empty() {
                    return None;
                }
                picked.sort_by_key(|(index, _)| *index);
                Some(Value::Array(picked.into_iter().map(|(_, v)| v).collect()))
            }
            _ => None,
        }
    }

    fn select_object(&self, map: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, child) in &self.children {
            if let Some(selected) = map.get(key).and_then(|value| child.select(value)) {
                out.insert(key.clone(), selected);
            }
        }
        out
    }
}

/// Parse an array index segment: ASCII digits with no leading zero.
fn parse_index(segment: &str) -> Option<usize> {
    let digits = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    if !digits || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse().ok()
}
