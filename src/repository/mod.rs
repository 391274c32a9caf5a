//! Repository layer for the `mushrooms` collection.
//!
//! The capability set is a trait so controllers can be exercised against
//! either the real remote store or the in-memory mock. Live queries hand
//! back a [`Subscription`]: a channel of full result-set snapshots that the
//! owner cancels by dropping or calling [`Subscription::cancel`].

mod mock;
mod remote;

pub use mock::MockMushroomRepository;
pub use remote::RemoteMushroomRepository;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::Mushroom;

/// One delivery from a live query: the full current result set, or the
/// error that broke the query.
pub type Snapshot = Result<Vec<Mushroom>, RepositoryError>;

/// Errors that can occur during repository operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// Remote store is not configured (missing server_url or api_key)
    NotConfigured,
    /// Failed to encode the selected image before upload
    ImageEncoding(String),
    /// Asset upload failed
    Upload(String),
    /// Record write failed
    Persist(String),
    /// The live query itself failed
    Subscription(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::NotConfigured => write!(
                f,
                "Remote store not configured. Add server_url and api_key to config."
            ),
            RepositoryError::ImageEncoding(e) => write!(f, "Image encoding error: {}", e),
            RepositoryError::Upload(e) => write!(f, "Upload error: {}", e),
            RepositoryError::Persist(e) => write!(f, "Persist error: {}", e),
            RepositoryError::Subscription(e) => write!(f, "Subscription error: {}", e),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Capability set over the remote backend.
///
/// No transport types appear in the signatures; implementations own all
/// storage details.
#[async_trait]
pub trait MushroomRepository: Send + Sync {
    /// Opens a live query over the caller's mushrooms.
    ///
    /// Every remote change re-delivers the full current result set, not a
    /// diff. The query stays open until the subscription is cancelled.
    async fn fetch_user_mushrooms(&self, user_id: &str)
        -> Result<Subscription, RepositoryError>;

    /// Persists a record.
    ///
    /// Updates in place and returns the same id when `mushroom.id` is set;
    /// inserts and returns the newly allocated id otherwise.
    async fn save_mushroom(&self, mushroom: &Mushroom) -> Result<String, RepositoryError>;

    /// Encodes and uploads an image, returning its public URL.
    async fn upload_image(&self, image_bytes: &[u8]) -> Result<String, RepositoryError>;
}

/// Handle to an open live query.
///
/// Dropping the handle tears the query down; [`Subscription::cancel`] does
/// the same explicitly and is safe to call more than once.
pub struct Subscription {
    receiver: mpsc::Receiver<Snapshot>,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps a plain delivery channel (used by the mock).
    pub fn new(receiver: mpsc::Receiver<Snapshot>) -> Self {
        Self {
            receiver,
            reader: None,
        }
    }

    /// Wraps a delivery channel fed by a background reader task.
    pub fn with_reader(receiver: mpsc::Receiver<Snapshot>, reader: JoinHandle<()>) -> Self {
        Self {
            receiver,
            reader: Some(reader),
        }
    }

    /// Waits for the next delivery. Returns `None` once the query is closed.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Tears down the live query. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
