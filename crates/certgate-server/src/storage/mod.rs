//! Storage abstraction for user records
//!
//! The directory talks to a [`UserStore`], with an in-memory backend by
//! default and PostgreSQL behind the `postgres` feature.
//!
//! Backends are the authority on uniqueness:
//! - `insert_user` rejects a duplicate ID or an alias held by another user
//!   atomically, whatever any earlier pre-check said
//! - `update_user` is a compare-and-swap on the record revision, so two
//!   writers that read the same revision cannot both commit

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use certgate_core::{InfoDocument, UserRecord};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Alias already taken: {0}")]
    AliasTaken(String),

    #[error("Revision mismatch for user {id}: expected {expected}")]
    RevisionMismatch { id: String, expected: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// A conditional write against one user record
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpdate {
    pub id: String,
    /// Revision the caller read; the write fails if the record moved since
    pub expected_revision: u64,
    /// Replacement info document, if it changed
    pub info: Option<InfoDocument>,
    /// Replacement alias set, if it changed
    pub aliases: Option<BTreeSet<String>>,
}

impl UserUpdate {
    pub fn new(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            expected_revision: record.revision,
            info: None,
            aliases: None,
        }
    }

    pub fn with_info(mut self, info: InfoDocument) -> Self {
        self.info = Some(info);
        self
    }

    pub fn with_aliases(mut self, aliases: BTreeSet<String>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.info.is_none() && self.aliases.is_none()
    }
}

/// Storage backend for user records
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait UserStore: Send + Sync + Debug {
    // =========================================================================
    // Records
    // =========================================================================

    /// Insert a new record with revision 0
    async fn insert_user(&self, record: UserRecord) -> Result<UserRecord, StorageError>;

    /// Get a record by user ID
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StorageError>;

    /// Apply a conditional update, returning the record as committed
    async fn update_user(&self, update: UserUpdate) -> Result<UserRecord, StorageError>;

    /// Number of stored records
    async fn count_users(&self) -> Result<u64, StorageError>;

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Get the record holding an alias
    async fn find_by_alias(&self, alias: &str) -> Result<Option<UserRecord>, StorageError>;

    /// Which of `aliases` are held by users other than `owner`
    async fn aliases_in_use(
        &self,
        aliases: &BTreeSet<String>,
        owner: Option<&str>,
    ) -> Result<BTreeSet<String>, StorageError>;
}
