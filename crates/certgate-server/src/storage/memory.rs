//! In-memory storage backend
//!
//! Default storage implementation. Records and the alias index share one
//! lock so that uniqueness checks and writes happen together.
//! Data is lost on restart.

use async_trait::async_trait;
use certgate_core::UserRecord;
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{StorageError, UserStore, UserUpdate};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    /// alias -> owning user ID
    aliases: HashMap<String, String>,
}

impl Tables {
    fn first_foreign_alias<'a>(
        &self,
        aliases: impl IntoIterator<Item = &'a String>,
        owner: &str,
    ) -> Option<&'a String> {
        aliases
            .into_iter()
            .find(|alias| matches!(self.aliases.get(*alias), Some(holder) if holder != owner))
    }
}

/// In-memory user store implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, mut record: UserRecord) -> Result<UserRecord, StorageError> {
        let mut tables = self.write()?;

        if tables.users.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(record.id));
        }
        if let Some(alias) = tables.first_foreign_alias(&record.aliases, &record.id) {
            return Err(StorageError::AliasTaken(alias.clone()));
        }

        record.revision = 0;
        for alias in &record.aliases {
            tables.aliases.insert(alias.clone(), record.id.clone());
        }
        info!(user_id = %record.id, aliases = record.aliases.len(), "Inserted user");
        tables.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StorageError> {
        Ok(self.read()?.users.get(id).cloned())
    }

    async fn update_user(&self, update: UserUpdate) -> Result<UserRecord, StorageError> {
        let mut tables = self.write()?;

        let current = tables
            .users
            .get(&update.id)
            .ok_or_else(|| StorageError::NotFound(update.id.clone()))?;
        if current.revision != update.expected_revision {
            debug!(
                user_id = %update.id,
                expected = update.expected_revision,
                actual = current.revision,
                "Revision mismatch"
            );
            return Err(StorageError::RevisionMismatch {
                id: update.id,
                expected: update.expected_revision,
            });
        }
        if let Some(aliases) = &update.aliases {
            if let Some(alias) = tables.first_foreign_alias(aliases, &update.id) {
                return Err(StorageError::AliasTaken(alias.clone()));
            }
        }

        let mut next = current.clone();
        if let Some(info) = update.info {
            next.info = info;
        }
        if let Some(aliases) = update.aliases {
            for dropped in next.aliases.difference(&aliases) {
                tables.aliases.remove(dropped);
            }
            for alias in &aliases {
                tables.aliases.insert(alias.clone(), next.id.clone());
            }
            next.aliases = aliases;
        }
        next.revision += 1;

        debug!(user_id = %next.id, revision = next.revision, "Updated user");
        tables.users.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        Ok(self.read()?.users.len() as u64)
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<UserRecord>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .aliases
            .get(alias)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn aliases_in_use(
        &self,
        aliases: &BTreeSet<String>,
        owner: Option<&str>,
    ) -> Result<BTreeSet<String>, StorageError> {
        let tables = self.read()?;
        Ok(aliases
            .iter()
            .filter(|alias| match (tables.aliases.get(*alias), owner) {
                (Some(holder), Some(owner)) => holder != owner,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect())
    }
}
