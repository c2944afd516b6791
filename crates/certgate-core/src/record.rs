//! User records and alias handling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CertgateError, Result};
use crate::identity::user_id_from_base64;

/// The per-user document clients read and patch
pub type InfoDocument = Map<String, Value>;

/// A persisted user
///
/// `id` and `cert` are fixed at creation. `aliases` and `info` change through
/// patches. `revision` is store bookkeeping for compare-and-swap writes and is
/// never sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,

    /// Base64 text of the DER certificate that produced `id`
    pub cert: String,

    #[serde(default)]
    pub aliases: BTreeSet<String>,

    #[serde(default)]
    pub info: InfoDocument,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub revision: u64,
}

impl UserRecord {
    /// Build a fresh record for a base64 certificate, deriving its ID.
    pub fn new(cert_base64: impl Into<String>, aliases: BTreeSet<String>) -> Result<Self> {
        let cert = cert_base64.into();
        let id = user_id_from_base64(&cert)?;
        Ok(Self {
            id: id.into_string(),
            cert,
            aliases,
            info: InfoDocument::new(),
            created_at: Utc::now(),
            revision: 0,
        })
    }
}

/// Aliases as clients send them: one string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasInput {
    One(String),
    Many(Vec<String>),
}

impl AliasInput {
    /// Normalize into a set, trimming entries and rejecting empty ones.
    pub fn normalize(&self) -> Result<BTreeSet<String>> {
        let raw: Vec<&str> = match self {
            AliasInput::One(alias) => vec![alias.as_str()],
            AliasInput::Many(aliases) => aliases.iter().map(String::as_str).collect(),
        };
        raw.into_iter().map(normalize_alias).collect()
    }
}

/// Trim an alias and reject it when nothing is left.
pub fn normalize_alias(alias: &str) -> Result<String> {
    let trimmed = alias.trim();
    if trimmed.is_empty() {
        return Err(CertgateError::InvalidInput(
            "Aliases must be non-empty strings".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Apply an alias patch (`alias -> keep?`) to the current set.
///
/// `true` keeps or adds the alias, `false` removes it if present.
pub fn apply_alias_changes(
    current: &BTreeSet<String>,
    changes: &BTreeMap<String, bool>,
) -> Result<BTreeSet<String>> {
    let mut next = current.clone();
    for (alias, keep) in changes {
        let alias = normalize_alias(alias)?;
        if *keep {
            next.insert(alias);
        } else {
            next.remove(&alias);
        }
    }
    Ok(next)
}
