//! In-memory mushroom repository for deterministic tests.
//!
//! Failure modes, latency, and delivered snapshots are all configurable, and
//! upload/save/fetch invocations are counted so tests can assert that a
//! phase never ran.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MushroomRepository, RepositoryError, Snapshot, Subscription};
use crate::models::Mushroom;

const MOCK_DOCUMENT_ID: &str = "mockDocumentID";
const MOCK_UPLOAD_URL: &str = "https://example.com/image.jpg";

struct MockState {
    mushrooms: Vec<Mushroom>,
    fetch_error: Option<RepositoryError>,
    save_error: Option<RepositoryError>,
    upload_error: Option<RepositoryError>,
    upload_url: String,
    document_id: String,
    latency: Option<Duration>,
    snapshot_tx: Option<mpsc::Sender<Snapshot>>,
}

pub struct MockMushroomRepository {
    state: Mutex<MockState>,
    fetch_calls: AtomicUsize,
    save_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl Default for MockMushroomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMushroomRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                mushrooms: Vec::new(),
                fetch_error: None,
                save_error: None,
                upload_error: None,
                upload_url: MOCK_UPLOAD_URL.to_string(),
                document_id: MOCK_DOCUMENT_ID.to_string(),
                latency: None,
                snapshot_tx: None,
            }),
            fetch_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_mushrooms(mushrooms: Vec<Mushroom>) -> Self {
        let repo = Self::new();
        repo.lock().mushrooms = mushrooms;
        repo
    }

    pub fn set_fetch_error(&self, error: RepositoryError) {
        self.lock().fetch_error = Some(error);
    }

    pub fn set_save_error(&self, error: RepositoryError) {
        self.lock().save_error = Some(error);
    }

    pub fn set_upload_error(&self, error: RepositoryError) {
        self.lock().upload_error = Some(error);
    }

    pub fn set_upload_url(&self, url: impl Into<String>) {
        self.lock().upload_url = url.into();
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Delivers a fresh result set on the open subscription, as the remote
    /// store would after a change. Silently dropped if nobody is listening.
    pub async fn push_snapshot(&self, mushrooms: Vec<Mushroom>) {
        let tx = self.lock().snapshot_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(Ok(mushrooms)).await;
        }
    }

    /// Delivers a subscription error on the open subscription.
    pub async fn push_error(&self, error: RepositoryError) {
        let tx = self.lock().snapshot_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(Err(error)).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    async fn apply_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MushroomRepository for MockMushroomRepository {
    async fn fetch_user_mushrooms(
        &self,
        user_id: &str,
    ) -> Result<Subscription, RepositoryError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_latency().await;

        let (tx, rx) = mpsc::channel(16);
        let initial = {
            let mut state = self.lock();
            state.snapshot_tx = Some(tx.clone());
            match &state.fetch_error {
                Some(error) => Err(error.clone()),
                None => Ok(state
                    .mushrooms
                    .iter()
                    .filter(|m| m.user_id == user_id)
                    .cloned()
                    .collect()),
            }
        };
        let _ = tx.send(initial).await;

        Ok(Subscription::new(rx))
    }

    async fn save_mushroom(&self, mushroom: &Mushroom) -> Result<String, RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_latency().await;

        let mut state = self.lock();
        if let Some(error) = &state.save_error {
            return Err(error.clone());
        }

        let id = mushroom
            .id
            .clone()
            .unwrap_or_else(|| state.document_id.clone());
        let persisted = mushroom.clone().with_id(id.as_str());
        match state
            .mushrooms
            .iter_mut()
            .find(|m| m.id.as_deref() == Some(id.as_str()))
        {
            Some(existing) => *existing = persisted,
            None => state.mushrooms.push(persisted),
        }

        Ok(id)
    }

    async fn upload_image(&self, _image_bytes: &[u8]) -> Result<String, RepositoryError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_latency().await;

        let state = self.lock();
        match &state.upload_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.upload_url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geolocation;
    use chrono::Utc;

    fn sample_mushroom(id: &str, user_id: &str) -> Mushroom {
        Mushroom::new(
            "Chanterelle",
            "Bright yellow, funnel shaped",
            "https://example.com/photo.jpg",
            Utc::now(),
            Geolocation::new(51.509865, -0.118092),
            user_id,
        )
        .with_id(id)
    }

    #[tokio::test]
    async fn test_fetch_delivers_only_matching_user() {
        let repo = MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1", "user123"),
            sample_mushroom("2", "someone-else"),
        ]);

        let mut subscription = repo.fetch_user_mushrooms("user123").await.unwrap();
        let delivered = subscription.next().await.unwrap().unwrap();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_fetch_error_delivered_in_band() {
        let repo = MockMushroomRepository::new();
        repo.set_fetch_error(RepositoryError::Subscription("offline".into()));

        let mut subscription = repo.fetch_user_mushrooms("user123").await.unwrap();
        assert!(matches!(subscription.next().await, Some(Err(_))));
    }

    #[tokio::test]
    async fn test_save_new_record_allocates_mock_id() {
        let repo = MockMushroomRepository::new();
        let draft = Mushroom::new(
            "Morel",
            "Honeycomb cap",
            "https://example.com/morel.jpg",
            Utc::now(),
            Geolocation::new(10.0, 10.0),
            "user123",
        );

        let id = repo.save_mushroom(&draft).await.unwrap();
        assert_eq!(id, "mockDocumentID");
        assert_eq!(repo.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_save_existing_record_keeps_id() {
        let repo = MockMushroomRepository::new();
        let existing = sample_mushroom("doc-7", "user123");

        let id = repo.save_mushroom(&existing).await.unwrap();
        assert_eq!(id, "doc-7");

        // Repeated saves update, never duplicate.
        repo.save_mushroom(&existing).await.unwrap();
        assert_eq!(repo.lock().mushrooms.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_returns_configured_url() {
        let repo = MockMushroomRepository::new();
        let url = repo.upload_image(&[1, 2, 3]).await.unwrap();
        assert_eq!(url, "https://example.com/image.jpg");
        assert_eq!(repo.upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_push_snapshot_reaches_subscriber() {
        let repo = MockMushroomRepository::new();
        let mut subscription = repo.fetch_user_mushrooms("user123").await.unwrap();

        // Initial (empty) snapshot.
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 0);

        repo.push_snapshot(vec![sample_mushroom("1", "user123")])
            .await;
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 1);
    }
}
