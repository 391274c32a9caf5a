//! Controller for drafting and saving a new mushroom find.
//!
//! Holds the draft fields under edit and runs the two-phase save: the photo
//! is uploaded first, and the record is only written once a public URL for
//! it exists. A failed persist leaves the uploaded asset orphaned; that is
//! accepted and logged rather than compensated.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{Geolocation, Mushroom};
use crate::repository::{MushroomRepository, RepositoryError};

/// Errors surfaced by [`AddMushroomController::save_mushroom`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveMushroomError {
    /// Local precondition failure; no repository call was made
    FormIncompleteOrRepositoryNotSet,
    /// Photo upload failed; the record was never written
    Upload(RepositoryError),
    /// Record write failed after a successful upload
    Persist(RepositoryError),
}

impl std::fmt::Display for SaveMushroomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveMushroomError::FormIncompleteOrRepositoryNotSet => {
                write!(f, "Form is incomplete or no repository is set")
            }
            SaveMushroomError::Upload(e) => write!(f, "Photo upload failed: {}", e),
            SaveMushroomError::Persist(e) => write!(f, "Saving the record failed: {}", e),
        }
    }
}

impl std::error::Error for SaveMushroomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveMushroomError::FormIncompleteOrRepositoryNotSet => None,
            SaveMushroomError::Upload(e) | SaveMushroomError::Persist(e) => Some(e),
        }
    }
}

/// Draft state for a new find.
pub struct AddMushroomController {
    pub name: String,
    pub description: String,
    pub date_found: DateTime<Utc>,
    pub selected_image: Option<Vec<u8>>,
    pub geolocation: Option<Geolocation>,
    repository: Option<Arc<dyn MushroomRepository>>,
}

impl AddMushroomController {
    pub fn new(repository: Arc<dyn MushroomRepository>) -> Self {
        Self {
            repository: Some(repository),
            ..Self::detached()
        }
    }

    /// A controller with no repository; saving always fails the
    /// precondition check.
    pub fn detached() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            date_found: Utc::now(),
            selected_image: None,
            geolocation: None,
            repository: None,
        }
    }

    /// True iff the draft is saveable: name and description non-empty, an
    /// image selected, and a geolocation that is not the (0, 0) sentinel.
    pub fn form_complete(&self) -> bool {
        !self.name.is_empty()
            && !self.description.is_empty()
            && self.selected_image.is_some()
            && self.geolocation.map_or(false, |g| g.is_set())
    }

    /// Uploads the photo, then persists the record for `user_id`.
    ///
    /// Returns the persisted document id. The persist phase never runs when
    /// the upload fails, and nothing runs when the form is incomplete.
    pub async fn save_mushroom(&self, user_id: &str) -> Result<String, SaveMushroomError> {
        let (repository, image, geolocation) = match (
            &self.repository,
            &self.selected_image,
            self.geolocation,
        ) {
            (Some(repository), Some(image), Some(geolocation)) if self.form_complete() => {
                (repository, image, geolocation)
            }
            _ => return Err(SaveMushroomError::FormIncompleteOrRepositoryNotSet),
        };

        let photo_url = repository
            .upload_image(image)
            .await
            .map_err(SaveMushroomError::Upload)?;

        let mushroom = Mushroom::new(
            &self.name,
            &self.description,
            &photo_url,
            self.date_found,
            geolocation,
            user_id,
        );

        match repository.save_mushroom(&mushroom).await {
            Ok(id) => {
                tracing::debug!("Mushroom saved with id {}", id);
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(
                    "Record write failed, uploaded asset orphaned at {}: {}",
                    photo_url,
                    e
                );
                Err(SaveMushroomError::Persist(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockMushroomRepository;

    fn complete_draft(repo: Arc<MockMushroomRepository>) -> AddMushroomController {
        let mut controller = AddMushroomController::new(repo);
        controller.name = "Chanterelle".to_string();
        controller.description = "desc".to_string();
        controller.selected_image = Some(vec![0xFF, 0xD8, 0xFF]);
        controller.geolocation = Some(Geolocation::new(51.509865, -0.118092));
        controller
    }

    #[test]
    fn test_form_complete_requires_every_field() {
        let repo = Arc::new(MockMushroomRepository::new());
        let mut controller = complete_draft(repo);
        assert!(controller.form_complete());

        controller.name.clear();
        assert!(!controller.form_complete());
        controller.name = "Chanterelle".to_string();

        controller.description.clear();
        assert!(!controller.form_complete());
        controller.description = "desc".to_string();

        let image = controller.selected_image.take();
        assert!(!controller.form_complete());
        controller.selected_image = image;

        controller.geolocation = None;
        assert!(!controller.form_complete());

        // The origin is the "not set" sentinel...
        controller.geolocation = Some(Geolocation::new(0.0, 0.0));
        assert!(!controller.form_complete());

        // ...but a single zero component is a valid point.
        controller.geolocation = Some(Geolocation::new(0.0, -0.118092));
        assert!(controller.form_complete());
    }

    #[tokio::test]
    async fn test_save_success() {
        let repo = Arc::new(MockMushroomRepository::new());
        let controller = complete_draft(repo.clone());

        let id = controller.save_mushroom("user123").await.unwrap();

        assert_eq!(id, "mockDocumentID");
        assert_eq!(repo.upload_calls(), 1);
        assert_eq!(repo.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_form_never_touches_repository() {
        let repo = Arc::new(MockMushroomRepository::new());
        let mut controller = complete_draft(repo.clone());
        controller.name = "Test".to_string();
        controller.description.clear();

        let result = controller.save_mushroom("user123").await;

        assert_eq!(
            result,
            Err(SaveMushroomError::FormIncompleteOrRepositoryNotSet)
        );
        assert_eq!(repo.upload_calls(), 0);
        assert_eq!(repo.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_detached_controller_fails_precondition() {
        let mut controller = AddMushroomController::detached();
        controller.name = "Chanterelle".to_string();
        controller.description = "desc".to_string();
        controller.selected_image = Some(vec![1]);
        controller.geolocation = Some(Geolocation::new(10.0, 10.0));

        let result = controller.save_mushroom("user123").await;
        assert_eq!(
            result,
            Err(SaveMushroomError::FormIncompleteOrRepositoryNotSet)
        );
    }

    #[tokio::test]
    async fn test_upload_failure_skips_persist() {
        let repo = Arc::new(MockMushroomRepository::new());
        repo.set_upload_error(RepositoryError::Upload("storage unavailable".into()));
        let controller = complete_draft(repo.clone());

        let result = controller.save_mushroom("user123").await;

        assert_eq!(
            result,
            Err(SaveMushroomError::Upload(RepositoryError::Upload(
                "storage unavailable".into()
            )))
        );
        assert_eq!(repo.upload_calls(), 1);
        assert_eq!(repo.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces_store_error() {
        let repo = Arc::new(MockMushroomRepository::new());
        repo.set_save_error(RepositoryError::Persist("write denied".into()));
        let controller = complete_draft(repo.clone());

        let result = controller.save_mushroom("user123").await;

        assert_eq!(
            result,
            Err(SaveMushroomError::Persist(RepositoryError::Persist(
                "write denied".into()
            )))
        );
        assert_eq!(repo.upload_calls(), 1);
        assert_eq!(repo.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_saved_record_embeds_draft_and_upload() {
        let repo = Arc::new(MockMushroomRepository::new());
        repo.set_upload_url("https://example.com/image.jpg");
        let controller = complete_draft(repo.clone());

        controller.save_mushroom("user123").await.unwrap();

        let mut subscription = repo.fetch_user_mushrooms("user123").await.unwrap();
        let saved = subscription.next().await.unwrap().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "Chanterelle");
        assert_eq!(saved[0].photo_url, "https://example.com/image.jpg");
        assert_eq!(saved[0].user_id, "user123");
    }
}
