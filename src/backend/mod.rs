//! The data service everything else talks to: a JSON document store with
//! live queries, a blob store, and an identity provider.
//!
//! Handlers never touch SQL directly. They go through [`Backend`] and
//! [`IdentityProvider`], which is the whole contract the rest of the crate
//! relies on.

mod blobs;
mod identity;
mod records;

use std::str::FromStr;

use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use thiserror::Error;
use tokio::{sync::{broadcast, mpsc}, task::JoinHandle};

pub use blobs::{sanitize_segment, BlobHandle, BlobStore};
pub use identity::{Credentials, Identity, IdentityProvider};
pub use records::{OrderBy, Predicate, Record};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("blob storage error: {0}")]
    Blob(#[from] std::io::Error),

    #[error("invalid blob path {0:?}")]
    InvalidBlobPath(String),

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("an identity with email {0} already exists")]
    EmailTaken(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// A write to the document store. Live queries re-run when one lands in their collection.
#[derive(Debug, Clone)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

#[derive(Clone)]
pub struct Backend {
    db_pool: SqlitePool,
    changes: broadcast::Sender<Change>,
    blobs: BlobStore,
}

impl Backend {
    pub fn new(db_pool: SqlitePool, blobs: BlobStore) -> Self {
        Self {
            db_pool,
            changes: broadcast::channel(256).0,
            blobs,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    fn notify(&self, collection: &str, id: &str) {
        // nobody listening is fine
        let _ = self.changes.send(Change {
            collection: collection.to_owned(),
            id: id.to_owned(),
        });
    }
}

/// Opens the database and brings the schema up to date.
///
/// In-memory databases live and die with their connection, so those get a
/// single connection that is never recycled.
pub async fn connect(database_url: &str) -> Result<SqlitePool, BackendError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let db_pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

/// Handle on a live feed. Each item is the complete current state, never a diff.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops the
/// feed; a handle that is kept around keeps its task alive for as long as the
/// process runs.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
pub(crate) async fn test_backend() -> (Backend, IdentityProvider) {
    let db_pool = connect("sqlite::memory:").await.unwrap();
    let root = std::env::temp_dir().join(format!("linkal-test-{}", uuid::Uuid::now_v7().simple()));
    let blobs = BlobStore::new(root, "/blobs");

    (Backend::new(db_pool.clone(), blobs), IdentityProvider::new(db_pool))
}
