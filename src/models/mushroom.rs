use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A latitude/longitude pair.
///
/// The origin (0, 0) is the "not set" sentinel inherited from the remote
/// schema: a point on the equator or the prime meridian is valid, only the
/// exact origin counts as absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl Geolocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true unless this is the (0, 0) sentinel.
    pub fn is_set(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// A single mushroom find.
///
/// `id` is the backend document id: `None` means the record has not been
/// persisted yet; a save with `Some(id)` updates that document in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mushroom {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
    #[serde(rename = "dateFound")]
    pub date_found: DateTime<Utc>,
    pub geolocation: Geolocation,
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Wire form of a mushroom document in the `mushrooms` collection.
///
/// The document id is not part of the payload; it lives in the document
/// path. `dateFound` is the store-native timestamp: an integer count of
/// microseconds since the Unix epoch.
#[derive(Serialize, Deserialize)]
struct MushroomDocument {
    name: String,
    description: String,
    #[serde(rename = "photoUrl")]
    photo_url: String,
    #[serde(rename = "dateFound", with = "chrono::serde::ts_microseconds")]
    date_found: DateTime<Utc>,
    geolocation: Geolocation,
    #[serde(rename = "userID")]
    user_id: String,
}

impl Mushroom {
    /// Creates an unpersisted record.
    ///
    /// `date_found` is truncated to microsecond precision so a record always
    /// survives a trip through the wire form unchanged.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        photo_url: impl Into<String>,
        date_found: DateTime<Utc>,
        geolocation: Geolocation,
        user_id: impl Into<String>,
    ) -> Self {
        let date_found =
            DateTime::from_timestamp_micros(date_found.timestamp_micros()).unwrap_or(date_found);
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            photo_url: photo_url.into(),
            date_found,
            geolocation,
            user_id: user_id.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Decodes a remote document payload.
    ///
    /// All-or-nothing: any missing or mistyped field invalidates the whole
    /// record and `None` is returned. Callers drop such documents from the
    /// delivered set rather than failing the fetch.
    pub fn from_document(document_id: &str, data: &Value) -> Option<Self> {
        let doc: MushroomDocument = serde_json::from_value(data.clone()).ok()?;
        Some(Self {
            id: Some(document_id.to_string()),
            name: doc.name,
            description: doc.description,
            photo_url: doc.photo_url,
            date_found: doc.date_found,
            geolocation: doc.geolocation,
            user_id: doc.user_id,
        })
    }

    /// Encodes the record into its canonical wire form.
    pub fn to_document(&self) -> Value {
        let doc = MushroomDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            photo_url: self.photo_url.clone(),
            date_found: self.date_found,
            geolocation: self.geolocation,
            user_id: self.user_id.clone(),
        };
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }
}
