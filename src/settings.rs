//! Tuning parameters for the multi-tile viewer and their session-scoped store.
//!
//! Overrides are stored next to a signature of the defaults they were made
//! against. When the defaults change, the stored override is dropped so an
//! old override never hides a new default.

use crate::error::SettingsError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STORE_FILE_NAME: &str = "viewer-settings.json";

/// Field name, inclusive minimum, inclusive maximum
const FIELD_RANGES: [(&str, i64, i64); 10] = [
    ("poll_ms", 1_000, 120_000),
    ("grid_cols", 1, 12),
    ("grid_rows", 1, 12),
    ("grid_gap_px", 0, 120),
    ("margin_left_px", 0, 400),
    ("margin_right_px", 0, 400),
    ("margin_top_px", 0, 400),
    ("margin_bottom_px", 0, 400),
    ("fade_ms", 0, 10_000),
    ("stagger_ms", 0, 5_000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSettings {
    pub poll_ms: u64,
    pub grid_cols: u32,
    pub grid_rows: u32,
    pub grid_gap_px: u32,
    pub margin_left_px: u32,
    pub margin_right_px: u32,
    pub margin_top_px: u32,
    pub margin_bottom_px: u32,
    pub fade_ms: u64,
    pub stagger_ms: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            poll_ms: 10_000,
            grid_cols: 4,
            grid_rows: 3,
            grid_gap_px: 12,
            margin_left_px: 24,
            margin_right_px: 24,
            margin_top_px: 24,
            margin_bottom_px: 24,
            fade_ms: 800,
            stagger_ms: 120,
        }
    }
}

impl ViewerSettings {
    fn fields(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([
            ("poll_ms", self.poll_ms as i64),
            ("grid_cols", self.grid_cols as i64),
            ("grid_rows", self.grid_rows as i64),
            ("grid_gap_px", self.grid_gap_px as i64),
            ("margin_left_px", self.margin_left_px as i64),
            ("margin_right_px", self.margin_right_px as i64),
            ("margin_top_px", self.margin_top_px as i64),
            ("margin_bottom_px", self.margin_bottom_px as i64),
            ("fade_ms", self.fade_ms as i64),
            ("stagger_ms", self.stagger_ms as i64),
        ])
    }

    /// Check every range invariant, collecting all violations
    pub fn validate(&self) -> Result<(), Vec<String>> {
        check_ranges(&self.fields())
    }

    /// Number of tiles shown at once
    pub fn tile_count(&self) -> usize {
        (self.grid_cols as usize) * (self.grid_rows as usize)
    }
}

fn check_ranges(values: &BTreeMap<&'static str, i64>) -> Result<(), Vec<String>> {
    let violations: Vec<String> = FIELD_RANGES
        .iter()
        .filter_map(|(name, min, max)| {
            let value = values.get(name).copied().unwrap_or_default();
            (value < *min || value > *max)
                .then(|| format!("{} must be between {} and {} (got {})", name, min, max, value))
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Hash of the default values a stored override was made against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSignature(String);

impl EnvSignature {
    pub fn of(defaults: &ViewerSettings) -> Self {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in defaults.fields() {
            hasher.update(name.as_bytes());
            hasher.update(&value.to_le_bytes());
        }
        Self(hasher.finalize().to_hex()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSettings {
    signature: EnvSignature,
    settings: ViewerSettings,
}

enum Backend {
    Memory(Mutex<Option<String>>),
    File(PathBuf),
}

/// Session-scoped persistence for viewer overrides
pub struct SettingsStore {
    backend: Backend,
    defaults: ViewerSettings,
    signature: EnvSignature,
}

impl SettingsStore {
    /// Store kept in process memory only
    pub fn memory(defaults: ViewerSettings) -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(None)),
            signature: EnvSignature::of(&defaults),
            defaults,
        }
    }

    /// Store backed by a JSON file in the session directory
    pub fn file<P: AsRef<Path>>(dir: P, defaults: ViewerSettings) -> Self {
        Self {
            backend: Backend::File(dir.as_ref().join(STORE_FILE_NAME)),
            signature: EnvSignature::of(&defaults),
            defaults,
        }
    }

    pub fn defaults(&self) -> ViewerSettings {
        self.defaults
    }

    pub fn signature(&self) -> &EnvSignature {
        &self.signature
    }

    /// Effective settings: the stored override when it still matches the
    /// current defaults, otherwise the defaults.
    pub fn load(&self) -> Result<ViewerSettings, SettingsError> {
        let raw = match self.read_raw()? {
            Some(raw) => raw,
            None => return Ok(self.defaults),
        };

        let stored: StoredSettings = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Discarding unreadable viewer settings: {}", e);
                self.clear()?;
                return Ok(self.defaults);
            }
        };

        if stored.signature != self.signature {
            info!(
                "Viewer defaults changed ({} -> {}), discarding stored override",
                stored.signature.as_str(),
                self.signature.as_str()
            );
            self.clear()?;
            return Ok(self.defaults);
        }

        if let Err(violations) = stored.settings.validate() {
            warn!(
                "Discarding invalid stored viewer settings: {}",
                violations.join("; ")
            );
            self.clear()?;
            return Ok(self.defaults);
        }

        Ok(stored.settings)
    }

    /// Validate and persist an override
    pub fn save(&self, settings: &ViewerSettings) -> Result<(), SettingsError> {
        settings.validate().map_err(SettingsError::Invalid)?;

        let raw = serde_json::to_string_pretty(&StoredSettings {
            signature: self.signature.clone(),
            settings: *settings,
        })?;

        match &self.backend {
            Backend::Memory(slot) => *slot.lock() = Some(raw),
            Backend::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, raw)?;
            }
        }

        debug!("Viewer settings saved under signature {}", self.signature.as_str());
        Ok(())
    }

    /// Drop any stored override
    pub fn clear(&self) -> Result<(), SettingsError> {
        match &self.backend {
            Backend::Memory(slot) => {
                slot.lock().take();
            }
            Backend::File(path) => match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn read_raw(&self) -> Result<Option<String>, SettingsError> {
        match &self.backend {
            Backend::Memory(slot) => Ok(slot.lock().clone()),
            Backend::File(path) => match fs::read_to_string(path) {
                Ok(raw) => Ok(Some(raw)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }
}

/// Unvalidated edits from the settings panel.
///
/// Values are range-checked only on [`SettingsDraft::commit`].
#[derive(Debug, Clone)]
pub struct SettingsDraft {
    values: BTreeMap<&'static str, i64>,
}

impl SettingsDraft {
    pub fn from_settings(settings: &ViewerSettings) -> Self {
        Self {
            values: settings.fields(),
        }
    }

    /// Apply one `field=value` edit
    pub fn set(&mut self, field: &str, raw: &str) -> Result<(), SettingsError> {
        let key = FIELD_RANGES
            .iter()
            .map(|(name, _, _)| *name)
            .find(|name| *name == field)
            .ok_or_else(|| SettingsError::UnknownField(field.to_string()))?;

        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| SettingsError::InvalidValue {
                field: field.to_string(),
                value: raw.to_string(),
            })?;

        self.values.insert(key, value);
        Ok(())
    }

    /// Apply an `a=1,b=2` style override list
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), SettingsError> {
        for entry in overrides {
            let (field, value) =
                entry
                    .split_once('=')
                    .ok_or_else(|| SettingsError::InvalidValue {
                        field: entry.clone(),
                        value: String::new(),
                    })?;
            self.set(field.trim(), value)?;
        }
        Ok(())
    }

    /// Validate the draft into concrete settings
    pub fn build(&self) -> Result<ViewerSettings, SettingsError> {
        check_ranges(&self.values).map_err(SettingsError::Invalid)?;

        let get = |name: &str| self.values.get(name).copied().unwrap_or_default();
        Ok(ViewerSettings {
            poll_ms: get("poll_ms") as u64,
            grid_cols: get("grid_cols") as u32,
            grid_rows: get("grid_rows") as u32,
            grid_gap_px: get("grid_gap_px") as u32,
            margin_left_px: get("margin_left_px") as u32,
            margin_right_px: get("margin_right_px") as u32,
            margin_top_px: get("margin_top_px") as u32,
            margin_bottom_px: get("margin_bottom_px") as u32,
            fade_ms: get("fade_ms") as u64,
            stagger_ms: get("stagger_ms") as u64,
        })
    }

    /// Validate and persist
    pub fn commit(&self, store: &SettingsStore) -> Result<ViewerSettings, SettingsError> {
        let settings = self.build()?;
        store.save(&settings)?;
        Ok(settings)
    }
}
