//! Remote document-store implementation of the mushroom repository.
//!
//! Record writes and asset uploads go over HTTP; the live query is a
//! WebSocket that pushes the full result set on every change, as a JSON
//! array of `{ "id": ..., "data": {...} }` documents.

use std::io::Cursor;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use super::{MushroomRepository, RepositoryError, Snapshot, Subscription};
use crate::config::StoreConfig;
use crate::models::Mushroom;

const JPEG_QUALITY: u8 = 75;
const DELIVERY_BUFFER: usize = 16;

/// Repository backed by the remote document store.
pub struct RemoteMushroomRepository {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
}

/// A document as pushed by the live query.
#[derive(Deserialize)]
struct WatchDocument {
    id: String,
    data: Value,
}

#[derive(Deserialize)]
struct SaveResponse {
    id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl RemoteMushroomRepository {
    /// Creates a repository from config.
    ///
    /// Returns an error if the remote store is not configured.
    pub fn from_config(config: &StoreConfig) -> Result<Self, RepositoryError> {
        let server_url = config
            .server_url
            .clone()
            .ok_or(RepositoryError::NotConfigured)?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(RepositoryError::NotConfigured)?;

        Ok(Self::new(server_url, api_key))
    }

    /// Creates a repository with explicit parameters.
    pub fn new(server_url: String, api_key: String) -> Self {
        Self {
            server_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/mushrooms", self.http_base_url())
    }

    /// Base URL for HTTP requests, normalizing ws(s) schemes to http(s).
    fn http_base_url(&self) -> String {
        if let Some(rest) = self.server_url.strip_prefix("ws://") {
            format!("http://{}", rest)
        } else if let Some(rest) = self.server_url.strip_prefix("wss://") {
            format!("https://{}", rest)
        } else if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        }
    }

    /// Builds the WebSocket URL for the per-user live query.
    fn build_watch_url(&self, user_id: &str) -> String {
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/collections/mushrooms/watch?userID={}&key={}",
            base_url,
            urlencoding::encode(user_id),
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl MushroomRepository for RemoteMushroomRepository {
    async fn fetch_user_mushrooms(
        &self,
        user_id: &str,
    ) -> Result<Subscription, RepositoryError> {
        let ws_url = self.build_watch_url(user_id);

        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| RepositoryError::Subscription(e.to_string()))?;
        tracing::debug!("Live query opened for user {}", user_id);

        let (mut sender, mut receiver) = ws_stream.split();
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);

        let reader = tokio::spawn(async move {
            loop {
                match receiver.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(decode_snapshot(text.as_str())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let snapshot = match std::str::from_utf8(&data) {
                            Ok(text) => decode_snapshot(text),
                            Err(e) => Err(RepositoryError::Subscription(e.to_string())),
                        };
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {
                        // Ignore other message types
                    }
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(RepositoryError::Subscription(e.to_string())))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
            let _ = sender.send(Message::Close(None)).await;
            tracing::debug!("Live query closed");
        });

        Ok(Subscription::with_reader(rx, reader))
    }

    async fn save_mushroom(&self, mushroom: &Mushroom) -> Result<String, RepositoryError> {
        let document = mushroom.to_document();

        match &mushroom.id {
            Some(id) => {
                tracing::debug!("Updating mushroom {}", id);
                self.client
                    .put(format!("{}/{}", self.collection_url(), id))
                    .query(&[("key", self.api_key.as_str())])
                    .json(&document)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| RepositoryError::Persist(e.to_string()))?;
                Ok(id.clone())
            }
            None => {
                tracing::debug!("Inserting new mushroom");
                let response: SaveResponse = self
                    .client
                    .post(self.collection_url())
                    .query(&[("key", self.api_key.as_str())])
                    .json(&document)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| RepositoryError::Persist(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| RepositoryError::Persist(e.to_string()))?;
                Ok(response.id)
            }
        }
    }

    async fn upload_image(&self, image_bytes: &[u8]) -> Result<String, RepositoryError> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| RepositoryError::ImageEncoding(e.to_string()))?;

        let mut encoded = Vec::new();
        img.write_to(
            &mut Cursor::new(&mut encoded),
            image::ImageOutputFormat::Jpeg(JPEG_QUALITY),
        )
        .map_err(|e| RepositoryError::ImageEncoding(e.to_string()))?;

        // Random key: timestamp-derived keys collide under rapid uploads.
        let asset_path = format!("images/{}.jpg", Uuid::new_v4());
        tracing::debug!("Uploading asset {}", asset_path);

        let response: UploadResponse = self
            .client
            .put(format!("{}/assets/{}", self.http_base_url(), asset_path))
            .query(&[("key", self.api_key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(encoded)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RepositoryError::Upload(e.to_string()))?
            .json()
            .await
            .map_err(|e| RepositoryError::Upload(e.to_string()))?;

        Ok(response.url)
    }
}

/// Decodes one live-query push into a full result set.
///
/// Malformed documents are dropped individually; only a payload that is not
/// a document array at all fails the delivery.
fn decode_snapshot(payload: &str) -> Snapshot {
    let documents: Vec<WatchDocument> = serde_json::from_str(payload)
        .map_err(|e| RepositoryError::Subscription(e.to_string()))?;

    Ok(documents
        .iter()
        .filter_map(|doc| match Mushroom::from_document(&doc.id, &doc.data) {
            Some(mushroom) => Some(mushroom),
            None => {
                tracing::warn!("Dropping malformed mushroom document {}", doc.id);
                None
            }
        })
        .collect())
}
