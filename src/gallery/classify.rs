use super::types::{MediaItem, MediaKind, MediaRecord};
use crate::config::GalleryConfig;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// File name allow-lists used to classify records
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierRules {
    pub image_prefixes: Vec<String>,
    pub image_extensions: Vec<String>,
    pub video_prefixes: Vec<String>,
    pub video_extensions: Vec<String>,
    pub qr_prefixes: Vec<String>,
}

impl ClassifierRules {
    pub fn from_config(config: &GalleryConfig) -> Self {
        let lower = |values: &[String]| -> Vec<String> {
            values.iter().map(|v| v.to_ascii_lowercase()).collect()
        };
        Self {
            image_prefixes: lower(&config.image_prefixes),
            image_extensions: lower(&config.image_extensions),
            video_prefixes: lower(&config.video_prefixes),
            video_extensions: lower(&config.video_extensions),
            qr_prefixes: lower(&config.qr_prefixes),
        }
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self::from_config(&crate::config::BoothConfig::default().gallery)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    QrCode,
    Media(MediaKind),
    Unrecognized,
}

/// Turns raw records into renderable items
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: ClassifierRules,
    media_base_url: String,
}

impl Classifier {
    pub fn new<S: Into<String>>(rules: ClassifierRules, media_base_url: S) -> Self {
        Self {
            rules,
            media_base_url: media_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    pub fn file_class(&self, file_name: &str) -> FileClass {
        let name = file_name.to_ascii_lowercase();
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        if self.rules.qr_prefixes.iter().any(|p| name.starts_with(p)) {
            return FileClass::QrCode;
        }

        let matches = |prefixes: &[String], extensions: &[String]| {
            extensions.iter().any(|e| e == extension)
                && (prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p)))
        };

        if matches(&self.rules.video_prefixes, &self.rules.video_extensions) {
            FileClass::Media(MediaKind::Video)
        } else if matches(&self.rules.image_prefixes, &self.rules.image_extensions) {
            FileClass::Media(MediaKind::Image)
        } else {
            FileClass::Unrecognized
        }
    }

    pub fn media_url(&self, record: &MediaRecord) -> String {
        let mut url = self.media_base_url.clone();
        for segment in [&record.event_code, &record.qrcode, &record.file_name] {
            if !segment.is_empty() {
                url.push('/');
                url.push_str(segment);
            }
        }
        url
    }

    /// Group by qrcode, attach each group's QR file to its media, drop the rest.
    ///
    /// Duplicate ids keep their last occurrence. When a group carries several
    /// QR files the last one wins.
    pub fn classify(&self, records: &[MediaRecord]) -> Vec<MediaItem> {
        let last_position: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();

        let mut groups: BTreeMap<&str, Vec<&MediaRecord>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            if last_position.get(record.id.as_str()) != Some(&i) {
                debug!("Dropping duplicate record {}", record.id);
                continue;
            }
            groups.entry(record.qrcode.as_str()).or_default().push(record);
        }

        let mut items = Vec::new();
        for (qrcode, group) in groups {
            let mut qrcode_url: Option<String> = None;
            let mut media = Vec::new();

            for record in group {
                match self.file_class(&record.file_name) {
                    FileClass::QrCode => {
                        if qrcode_url.is_some() {
                            debug!("Group {} has several QR files, keeping {}", qrcode, record.file_name);
                        }
                        qrcode_url = Some(self.media_url(record));
                    }
                    FileClass::Media(kind) => media.push((record, kind)),
                    FileClass::Unrecognized => {
                        debug!("Ignoring unrecognized file {}", record.file_name);
                    }
                }
            }

            if media.is_empty() && qrcode_url.is_some() {
                debug!("Group {} has only a QR file", qrcode);
            }

            items.extend(media.into_iter().map(|(record, kind)| MediaItem {
                id: record.id.clone(),
                kind,
                media_url: self.media_url(record),
                qrcode_url: qrcode_url.clone(),
                qrcode: record.qrcode.clone(),
                updated_at: record.updated_at,
                file_name: record.file_name.clone(),
                station_label: record.station_code.clone(),
                camera_mode_label: record.camera_mode.clone(),
                username: record.username.clone(),
            }));
        }

        items
    }
}
