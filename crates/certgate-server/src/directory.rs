//! User directory
//!
//! Resolves users by ID, alias or certificate, creates users, and reads and
//! patches their info documents on top of a [`UserStore`].
//!
//! Patches are committed with a compare-and-swap on the record revision. A
//! writer that loses the race re-reads the record and recomputes its patch
//! against the fresh document, so concurrent patches are serialized per user
//! and never silently dropped.

use base64::{engine::general_purpose::STANDARD, Engine};
use certgate_core::keypath::project;
use certgate_core::record::apply_alias_changes;
use certgate_core::{
    user_id_from_base64, AliasInput, CertgateError, InfoDocument, InfoPatchEngine, KeyPath,
    PatchMode, UserId, UserRecord,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{StorageError, UserStore, UserUpdate};

/// Message for a duplicate user ID
pub const DUPLICATE_USER_MESSAGE: &str = "User with given ID already exists";

/// Message when every compare-and-swap attempt lost
pub const CONCURRENT_MODIFICATION_MESSAGE: &str = "concurrent modification, retry the request";

/// Errors raised by directory operations
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error(transparent)]
    Rejected(#[from] CertgateError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Ways an identifier can name a user, in resolution priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    UserId,
    Alias,
    Certificate,
}

impl Resolution {
    pub const ORDER: [Resolution; 3] = [
        Resolution::UserId,
        Resolution::Alias,
        Resolution::Certificate,
    ];
}

/// Body of a patch request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatchRequest {
    /// JSON Patch operations or a merge patch, depending on the mode
    #[serde(default)]
    pub info: Option<Value>,
    /// alias -> keep (`true`) or drop (`false`)
    #[serde(default)]
    pub aliases: Option<BTreeMap<String, bool>>,
}

impl PatchRequest {
    fn ensure_present(&self) -> Result<(), CertgateError> {
        let info = self.info.as_ref().filter(|v| !v.is_null());
        if info.is_none() && self.aliases.is_none() {
            return Err(CertgateError::InvalidInput("Missing patch information".into()));
        }
        Ok(())
    }
}

/// Directory of users over a pluggable store
#[derive(Debug, Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    engine: InfoPatchEngine,
    max_patch_attempts: u32,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            engine: InfoPatchEngine::new(),
            max_patch_attempts: 5,
        }
    }

    /// Number of compare-and-swap attempts per patch (at least one)
    pub fn with_patch_attempts(mut self, attempts: u32) -> Self {
        self.max_patch_attempts = attempts.max(1);
        self
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Find a user by ID, alias, or certificate, in that order.
    pub async fn resolve(&self, identifier: &str) -> DirectoryResult<UserRecord> {
        match self.find(identifier).await? {
            Some((via, record)) => {
                debug!(identifier = %identifier, via = ?via, "Resolved user");
                Ok(record)
            }
            None => Err(not_found(identifier).into()),
        }
    }

    /// Try each strategy in turn; the first hit wins.
    pub async fn find(
        &self,
        identifier: &str,
    ) -> DirectoryResult<Option<(Resolution, UserRecord)>> {
        if identifier.is_empty() {
            return Ok(None);
        }
        for strategy in Resolution::ORDER {
            if let Some(record) = self.find_with(strategy, identifier).await? {
                return Ok(Some((strategy, record)));
            }
        }
        Ok(None)
    }

    async fn find_with(
        &self,
        strategy: Resolution,
        identifier: &str,
    ) -> DirectoryResult<Option<UserRecord>> {
        let record = match strategy {
            Resolution::UserId if UserId::is_well_formed(identifier) => {
                self.store.get_user(identifier).await?
            }
            Resolution::UserId => None,
            Resolution::Alias => self.store.find_by_alias(identifier).await?,
            Resolution::Certificate => {
                // Only a well-formed base64 certificate can name a user
                if STANDARD.decode(identifier).is_err() {
                    return Ok(None);
                }
                match user_id_from_base64(identifier) {
                    Ok(id) => self.store.get_user(id.as_str()).await?,
                    Err(_) => None,
                }
            }
        };
        Ok(record)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a user from a base64 certificate.
    pub async fn create(
        &self,
        cert_base64: &str,
        aliases: Option<&AliasInput>,
    ) -> DirectoryResult<UserRecord> {
        let cert_base64 = cert_base64.trim();
        if cert_base64.is_empty() {
            return Err(CertgateError::InvalidInput(
                "Public certificate must be a non-empty string".into(),
            )
            .into());
        }
        let aliases = match aliases {
            Some(input) => input.normalize()?,
            None => BTreeSet::new(),
        };

        let taken = self.store.aliases_in_use(&aliases, None).await?;
        if let Some(alias) = taken.iter().next() {
            warn!(alias = %alias, "Rejecting user creation with taken alias");
            return Err(alias_taken(alias).into());
        }

        let record = UserRecord::new(cert_base64, aliases)?;
        let created = self.store.insert_user(record).await?;
        info!(user_id = %created.id, aliases = ?created.aliases, "Created user");
        Ok(created)
    }

    // =========================================================================
    // Info documents
    // =========================================================================

    /// The user's info, optionally projected to key paths.
    pub async fn get_info(&self, id: &str, keys: &[KeyPath]) -> DirectoryResult<InfoDocument> {
        let record = self.require(id).await?;
        Ok(project(&record.info, keys))
    }

    /// One top-level namespace of the user's info, projected to key paths
    /// relative to the namespace.
    pub async fn get_namespace(
        &self,
        id: &str,
        namespace: &str,
        keys: &[KeyPath],
    ) -> DirectoryResult<Value> {
        let record = self.require(id).await?;
        let namespace_missing =
            || CertgateError::NotFound(format!("Namespace '{}' not found", namespace));

        let value = record.info.get(namespace).ok_or_else(namespace_missing)?;
        if keys.is_empty() {
            return Ok(value.clone());
        }

        match value {
            Value::Object(scope) => {
                let projected = project(scope, keys);
                if projected.is_empty() {
                    return Err(namespace_missing().into());
                }
                Ok(Value::Object(projected))
            }
            _ => Err(namespace_missing().into()),
        }
    }

    /// Overwrite the user's info document.
    pub async fn replace_info(&self, id: &str, info: InfoDocument) -> DirectoryResult<UserRecord> {
        for _ in 0..self.max_patch_attempts {
            let record = self.require(id).await?;
            match self
                .store
                .update_user(UserUpdate::new(&record).with_info(info.clone()))
                .await
            {
                Err(StorageError::RevisionMismatch { .. }) => continue,
                other => return Ok(other?),
            }
        }
        Err(CertgateError::Conflict(CONCURRENT_MODIFICATION_MESSAGE.into()).into())
    }

    /// Apply a patch request to the user's info and aliases.
    ///
    /// The patch is recomputed from a fresh read on every attempt, so a
    /// request that loses a race is applied on top of the winner's result.
    pub async fn patch_user(
        &self,
        id: &str,
        request: &PatchRequest,
        mode: PatchMode,
    ) -> DirectoryResult<UserRecord> {
        request.ensure_present()?;

        for attempt in 1..=self.max_patch_attempts {
            let record = self.require(id).await?;
            let update = self.prepare_update(&record, request, mode).await?;
            if update.is_empty() {
                debug!(user_id = %id, "Patch leaves user unchanged");
                return Ok(record);
            }

            match self.store.update_user(update).await {
                Ok(updated) => {
                    info!(user_id = %id, mode = ?mode, revision = updated.revision, "Patched user");
                    return Ok(updated);
                }
                Err(StorageError::RevisionMismatch { .. }) => {
                    debug!(user_id = %id, attempt, "Lost patch race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(user_id = %id, attempts = self.max_patch_attempts, "Giving up on contended patch");
        Err(CertgateError::Conflict(CONCURRENT_MODIFICATION_MESSAGE.into()).into())
    }

    async fn prepare_update(
        &self,
        record: &UserRecord,
        request: &PatchRequest,
        mode: PatchMode,
    ) -> DirectoryResult<UserUpdate> {
        let mut update = UserUpdate::new(record);

        if let Some(body) = request.info.as_ref().filter(|v| !v.is_null()) {
            let outcome = self.engine.compute(mode, &record.info, body)?;
            if !outcome.is_noop() {
                update = update.with_info(outcome.document);
            }
        }

        if let Some(changes) = &request.aliases {
            let next = apply_alias_changes(&record.aliases, changes)?;
            if next != record.aliases {
                let added: BTreeSet<String> = next.difference(&record.aliases).cloned().collect();
                let taken = self.store.aliases_in_use(&added, Some(&record.id)).await?;
                if let Some(alias) = taken.iter().next() {
                    return Err(alias_taken(alias).into());
                }
                update = update.with_aliases(next);
            }
        }

        Ok(update)
    }

    pub async fn count_users(&self) -> DirectoryResult<u64> {
        Ok(self.store.count_users().await?)
    }

    async fn require(&self, id: &str) -> DirectoryResult<UserRecord> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| not_found(id).into())
    }
}

fn not_found(identifier: &str) -> CertgateError {
    CertgateError::NotFound(format!("User '{}' not found", identifier))
}

fn alias_taken(alias: &str) -> CertgateError {
    CertgateError::Conflict(format!("Alias '{}' is already taken", alias))
}
