use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One file the backend reports for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub qrcode: String,
    #[serde(alias = "fileName")]
    pub file_name: String,
    #[serde(default, alias = "eventCode")]
    pub event_code: String,
    #[serde(default, alias = "stationCode")]
    pub station_code: Option<String>,
    #[serde(default, alias = "cameraMode")]
    pub camera_mode: Option<String>,
    #[serde(default, alias = "file_size", alias = "fileSize")]
    pub file_size_bytes: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<Value>,
}

impl MediaRecord {
    /// Minimal record, mostly for tests and fixtures
    pub fn new<S: Into<String>>(id: S, qrcode: S, file_name: S) -> Self {
        Self {
            id: id.into(),
            qrcode: qrcode.into(),
            file_name: file_name.into(),
            event_code: String::new(),
            station_code: None,
            camera_mode: None,
            file_size_bytes: None,
            username: None,
            created_at: None,
            updated_at: None,
            status: None,
        }
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn with_event_code<S: Into<String>>(mut self, event_code: S) -> Self {
        self.event_code = event_code.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Renderable projection of a record, with its group's QR side-file attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    pub media_url: String,
    pub qrcode_url: Option<String>,
    pub qrcode: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub file_name: String,
    pub station_label: Option<String>,
    pub camera_mode_label: Option<String>,
    pub username: Option<String>,
}

impl MediaItem {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
