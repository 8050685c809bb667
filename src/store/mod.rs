pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Account, Student};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Connection string that selects the in-process store instead of Postgres.
pub const MEMORY_URL: &str = "memory:";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("`{field}` is already taken")]
    Conflict { field: &'static str },
    #[error("stored record is unreadable: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is already registered.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Records ordered by admission number. With a `term`, only records where
    /// some searchable field contains it, ignoring case.
    async fn list_students(&self, term: Option<&str>) -> Result<Vec<Student>, StoreError>;

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError>;

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Replaces the stored record with the same id. `Ok(false)` if none exists.
    async fn replace_student(&self, student: &Student) -> Result<bool, StoreError>;

    /// `Ok(false)` if no record had that id.
    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Both stores behind one backend, picked from the connection string.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn CredentialStore>,
    pub students: Arc<dyn StudentStore>,
}

impl Stores {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if database_url == MEMORY_URL {
            log::warn!("Using the in-memory store; records are lost on shutdown");
            return Ok(Self::from_backend(Arc::new(MemoryStore::default())));
        }
        let store = PgStore::connect(database_url).await?;
        Ok(Self::from_backend(Arc::new(store)))
    }

    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: CredentialStore + StudentStore + 'static,
    {
        Self {
            accounts: backend.clone(),
            students: backend,
        }
    }
}
