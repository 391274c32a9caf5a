//! Controller for the signed-in user's mushroom list.
//!
//! Owns at most one live query at a time and republishes every delivered
//! result set wholesale through a watch channel. A delivery error leaves the
//! last published set in place and is reported through a separate channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::Mushroom;
use crate::repository::{MushroomRepository, RepositoryError};

pub struct MyMushroomsController {
    repository: Arc<dyn MushroomRepository>,
    mushrooms: Arc<watch::Sender<Vec<Mushroom>>>,
    last_error: Arc<watch::Sender<Option<RepositoryError>>>,
    // Bumped on every start/stop; a forwarding task publishes only while its
    // own generation is still current, so a late delivery after stop() is
    // discarded.
    generation: Arc<AtomicU64>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl MyMushroomsController {
    pub fn new(repository: Arc<dyn MushroomRepository>) -> Self {
        let (mushrooms, _) = watch::channel(Vec::new());
        let (last_error, _) = watch::channel(None);
        Self {
            repository,
            mushrooms: Arc::new(mushrooms),
            last_error: Arc::new(last_error),
            generation: Arc::new(AtomicU64::new(0)),
            listener: Mutex::new(None),
        }
    }

    /// The published record set. Replaced wholesale on every delivery.
    pub fn mushrooms(&self) -> watch::Receiver<Vec<Mushroom>> {
        self.mushrooms.subscribe()
    }

    /// The most recent subscription or delivery error, if any.
    pub fn last_error(&self) -> watch::Receiver<Option<RepositoryError>> {
        self.last_error.subscribe()
    }

    /// Begins listening for the given user's mushrooms.
    ///
    /// Callers must pass an authenticated user id; an empty id is a no-op.
    /// Any prior subscription is torn down first, so a controller never has
    /// two live queries delivering at once.
    pub async fn start(&self, user_id: &str) {
        if user_id.is_empty() {
            tracing::warn!("start called without an authenticated user");
            return;
        }

        self.stop();
        let generation = self.generation.load(Ordering::SeqCst);
        tracing::debug!("Listening for mushrooms of user {}", user_id);

        let mut subscription = match self.repository.fetch_user_mushrooms(user_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!("Failed to open live query: {}", e);
                self.last_error.send_replace(Some(e));
                return;
            }
        };

        let mushrooms = Arc::clone(&self.mushrooms);
        let last_error = Arc::clone(&self.last_error);
        let generations = Arc::clone(&self.generation);

        let task = tokio::spawn(async move {
            while let Some(delivery) = subscription.next().await {
                if generations.load(Ordering::SeqCst) != generation {
                    break;
                }
                match delivery {
                    Ok(records) => {
                        mushrooms.send_replace(records);
                    }
                    Err(e) => {
                        // Keep the previously published set.
                        tracing::warn!("Error fetching mushrooms: {}", e);
                        last_error.send_replace(Some(e));
                    }
                }
            }
        });

        let mut listener = self.listener.lock().expect("listener lock poisoned");
        *listener = Some(task);
    }

    /// Stops listening. Safe to call repeatedly or when already idle.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut listener = self.listener.lock().expect("listener lock poisoned");
        if let Some(task) = listener.take() {
            task.abort();
        }
    }
}

impl Drop for MyMushroomsController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geolocation;
    use crate::repository::MockMushroomRepository;
    use chrono::Utc;
    use std::time::Duration;

    fn sample_mushroom(id: &str) -> Mushroom {
        Mushroom::new(
            "Chanterelle",
            "Bright yellow, funnel shaped",
            "https://example.com/photo.jpg",
            Utc::now(),
            Geolocation::new(51.509865, -0.118092),
            "user123",
        )
        .with_id(id)
    }

    #[tokio::test]
    async fn test_start_publishes_initial_set() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
            sample_mushroom("2"),
        ]));
        let controller = MyMushroomsController::new(repo.clone());
        let mut published = controller.mushrooms();

        controller.start("user123").await;

        published.changed().await.unwrap();
        assert_eq!(published.borrow_and_update().len(), 2);
    }

    #[tokio::test]
    async fn test_delivery_replaces_set_wholesale() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
            sample_mushroom("2"),
        ]));
        let controller = MyMushroomsController::new(repo.clone());
        let mut published = controller.mushrooms();

        controller.start("user123").await;
        published.changed().await.unwrap();
        assert_eq!(published.borrow_and_update().len(), 2);

        repo.push_snapshot(vec![sample_mushroom("3")]).await;

        published.changed().await.unwrap();
        let current = published.borrow_and_update();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_delivery_error_retains_previous_set() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
        ]));
        let controller = MyMushroomsController::new(repo.clone());
        let mut published = controller.mushrooms();
        let mut errors = controller.last_error();

        controller.start("user123").await;
        published.changed().await.unwrap();
        assert_eq!(published.borrow_and_update().len(), 1);

        repo.push_error(RepositoryError::Subscription("connection lost".into()))
            .await;

        errors.changed().await.unwrap();
        assert!(errors.borrow_and_update().is_some());
        assert!(!published.has_changed().unwrap());
        assert_eq!(published.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_no_deliveries_after_stop() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
        ]));
        let controller = MyMushroomsController::new(repo.clone());
        let mut published = controller.mushrooms();

        controller.start("user123").await;
        published.changed().await.unwrap();
        published.borrow_and_update();

        controller.stop();
        controller.stop(); // idempotent

        repo.push_snapshot(vec![sample_mushroom("2"), sample_mushroom("3")])
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!published.has_changed().unwrap());
        assert_eq!(published.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_during_slow_fetch_discards_late_subscription() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
        ]));
        repo.set_latency(Duration::from_millis(50));
        let controller = Arc::new(MyMushroomsController::new(repo.clone()));
        let mut published = controller.mushrooms();

        // Stop while start() is still waiting on the repository, so the
        // subscription arrives carrying a stale generation.
        let starter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start("user123").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.stop();
        starter.await.unwrap();

        repo.push_snapshot(vec![sample_mushroom("2")]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!published.has_changed().unwrap());
        assert_eq!(published.borrow().len(), 0);
        assert_eq!(repo.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_with_empty_user_is_noop() {
        let repo = Arc::new(MockMushroomRepository::new());
        let controller = MyMushroomsController::new(repo.clone());

        controller.start("").await;

        assert_eq!(repo.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_restart_tears_down_previous_subscription() {
        let repo = Arc::new(MockMushroomRepository::with_mushrooms(vec![
            sample_mushroom("1"),
        ]));
        let controller = MyMushroomsController::new(repo.clone());
        let mut published = controller.mushrooms();

        controller.start("user123").await;
        published.changed().await.unwrap();
        published.borrow_and_update();

        controller.start("user123").await;
        assert_eq!(repo.fetch_calls(), 2);

        // Only the new subscription delivers.
        published.changed().await.unwrap();
        assert_eq!(published.borrow_and_update().len(), 1);

        repo.push_snapshot(vec![]).await;
        published.changed().await.unwrap();
        assert_eq!(published.borrow_and_update().len(), 0);
    }
}
