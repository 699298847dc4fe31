use crate::settings::ViewerSettings;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothConfig {
    pub api: ApiConfig,
    pub gallery: GalleryConfig,
    pub viewer: ViewerSettings,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the booth backend REST service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL media files are served from
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,

    /// Per-request network timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GalleryConfig {
    /// Event whose media is shown
    #[serde(default)]
    pub event_code: String,

    /// Gallery poll interval in milliseconds
    #[serde(default = "default_gallery_poll_ms")]
    pub poll_ms: u64,

    /// Rotation interval in milliseconds
    #[serde(default = "default_autoplay_ms")]
    pub autoplay_ms: u64,

    /// Start with autoplay on
    #[serde(default = "default_true")]
    pub autoplay: bool,

    /// Shuffle instead of newest-first
    #[serde(default)]
    pub randomize: bool,

    /// Render the QR overlay when an item has one
    #[serde(default = "default_true")]
    pub show_qr: bool,

    #[serde(default = "default_image_prefixes")]
    pub image_prefixes: Vec<String>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_prefixes")]
    pub video_prefixes: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// File name prefixes marking the QR side-file of a group
    #[serde(default = "default_qr_prefixes")]
    pub qr_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Printer steps are live; otherwise they are pre-seeded as done
    #[serde(default = "default_true")]
    pub print_enabled: bool,

    /// Link a recipient to the generated code after a run
    #[serde(default)]
    pub promo_enabled: bool,

    #[serde(default)]
    pub station_code: String,

    #[serde(default)]
    pub event_code: String,

    /// Working directory cleared by the first step
    #[serde(default = "default_work_path")]
    pub work_path: String,

    #[serde(default = "default_render_template")]
    pub render_template: String,

    #[serde(default)]
    pub printer_name: String,

    #[serde(default = "default_print_copies")]
    pub print_copies: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Session time-to-live poll interval in milliseconds
    #[serde(default = "default_ttl_poll_ms")]
    pub ttl_poll_ms: u64,

    /// Capture check poll interval in milliseconds
    #[serde(default = "default_capture_poll_ms")]
    pub capture_poll_ms: u64,

    #[serde(default)]
    pub station_code: String,

    /// Directory for session-scoped state (viewer overrides)
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Search-as-you-type debounce window in milliseconds
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

impl BoothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("boothsync.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let viewer = ViewerSettings::default();

        let settings = Config::builder()
            .set_default("api.base_url", default_base_url())?
            .set_default("api.media_base_url", default_media_base_url())?
            .set_default("api.request_timeout_ms", default_request_timeout_ms())?
            .set_default("gallery.event_code", "")?
            .set_default("gallery.poll_ms", default_gallery_poll_ms())?
            .set_default("gallery.autoplay_ms", default_autoplay_ms())?
            .set_default("gallery.autoplay", true)?
            .set_default("gallery.randomize", false)?
            .set_default("gallery.show_qr", true)?
            .set_default("gallery.image_prefixes", default_image_prefixes())?
            .set_default("gallery.image_extensions", default_image_extensions())?
            .set_default("gallery.video_prefixes", default_video_prefixes())?
            .set_default("gallery.video_extensions", default_video_extensions())?
            .set_default("gallery.qr_prefixes", default_qr_prefixes())?
            .set_default("viewer.poll_ms", viewer.poll_ms)?
            .set_default("viewer.grid_cols", viewer.grid_cols)?
            .set_default("viewer.grid_rows", viewer.grid_rows)?
            .set_default("viewer.grid_gap_px", viewer.grid_gap_px)?
            .set_default("viewer.margin_left_px", viewer.margin_left_px)?
            .set_default("viewer.margin_right_px", viewer.margin_right_px)?
            .set_default("viewer.margin_top_px", viewer.margin_top_px)?
            .set_default("viewer.margin_bottom_px", viewer.margin_bottom_px)?
            .set_default("viewer.fade_ms", viewer.fade_ms)?
            .set_default("viewer.stagger_ms", viewer.stagger_ms)?
            .set_default("pipeline.print_enabled", true)?
            .set_default("pipeline.promo_enabled", false)?
            .set_default("pipeline.station_code", "")?
            .set_default("pipeline.event_code", "")?
            .set_default("pipeline.work_path", default_work_path())?
            .set_default("pipeline.render_template", default_render_template())?
            .set_default("pipeline.printer_name", "")?
            .set_default("pipeline.print_copies", default_print_copies())?
            .set_default("session.ttl_poll_ms", default_ttl_poll_ms())?
            .set_default("session.capture_poll_ms", default_capture_poll_ms())?
            .set_default("session.station_code", "")?
            .set_default("session.store_dir", default_store_dir())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.search_debounce_ms", default_search_debounce_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // BOOTHSYNC_GALLERY__POLL_MS=5000
            .add_source(
                Environment::with_prefix("BOOTHSYNC")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("gallery.image_prefixes")
                    .with_list_parse_key("gallery.image_extensions")
                    .with_list_parse_key("gallery.video_prefixes")
                    .with_list_parse_key("gallery.video_extensions")
                    .with_list_parse_key("gallery.qr_prefixes")
                    .try_parsing(true),
            )
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "api.base_url must not be empty".to_string(),
            ));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "api.request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.gallery.poll_ms == 0 || self.gallery.autoplay_ms == 0 {
            return Err(ConfigError::Message(
                "gallery poll and autoplay intervals must be greater than 0".to_string(),
            ));
        }

        if self.gallery.image_extensions.is_empty() && self.gallery.video_extensions.is_empty() {
            return Err(ConfigError::Message(
                "At least one image or video extension must be configured".to_string(),
            ));
        }

        if self.gallery.qr_prefixes.is_empty() {
            return Err(ConfigError::Message(
                "gallery.qr_prefixes must not be empty".to_string(),
            ));
        }

        if let Err(violations) = self.viewer.validate() {
            return Err(ConfigError::Message(format!(
                "Invalid viewer defaults: {}",
                violations.join("; ")
            )));
        }

        if self.session.ttl_poll_ms == 0 || self.session.capture_poll_ms == 0 {
            return Err(ConfigError::Message(
                "session poll intervals must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.print_enabled && self.pipeline.print_copies == 0 {
            return Err(ConfigError::Message(
                "pipeline.print_copies must be greater than 0 when printing".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: default_base_url(),
                media_base_url: default_media_base_url(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            gallery: GalleryConfig {
                event_code: String::new(),
                poll_ms: default_gallery_poll_ms(),
                autoplay_ms: default_autoplay_ms(),
                autoplay: true,
                randomize: false,
                show_qr: true,
                image_prefixes: default_image_prefixes(),
                image_extensions: default_image_extensions(),
                video_prefixes: default_video_prefixes(),
                video_extensions: default_video_extensions(),
                qr_prefixes: default_qr_prefixes(),
            },
            viewer: ViewerSettings::default(),
            pipeline: PipelineConfig {
                print_enabled: true,
                promo_enabled: false,
                station_code: String::new(),
                event_code: String::new(),
                work_path: default_work_path(),
                render_template: default_render_template(),
                printer_name: String::new(),
                print_copies: default_print_copies(),
            },
            session: SessionConfig {
                ttl_poll_ms: default_ttl_poll_ms(),
                capture_poll_ms: default_capture_poll_ms(),
                station_code: String::new(),
                store_dir: default_store_dir(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                search_debounce_ms: default_search_debounce_ms(),
            },
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_media_base_url() -> String {
    "http://localhost:8000/media".to_string()
}
fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_gallery_poll_ms() -> u64 {
    5_000
}
fn default_autoplay_ms() -> u64 {
    4_000
}
fn default_image_prefixes() -> Vec<String> {
    vec!["RenderImage".to_string(), "Image".to_string()]
}
fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_video_prefixes() -> Vec<String> {
    vec!["RenderVideo".to_string(), "Video".to_string()]
}
fn default_video_extensions() -> Vec<String> {
    ["mp4", "webm", "mov"].iter().map(|s| s.to_string()).collect()
}
fn default_qr_prefixes() -> Vec<String> {
    vec!["qrcode".to_string()]
}

fn default_work_path() -> String {
    "./capture".to_string()
}
fn default_render_template() -> String {
    "default".to_string()
}
fn default_print_copies() -> u32 {
    1
}

fn default_ttl_poll_ms() -> u64 {
    5_000
}
fn default_capture_poll_ms() -> u64 {
    1_000
}
fn default_store_dir() -> String {
    "./.boothsync".to_string()
}

fn default_event_bus_capacity() -> usize {
    256
}
fn default_search_debounce_ms() -> u64 {
    400
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BoothConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.pipeline.print_enabled);
        assert!(!config.gallery.randomize);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BoothConfig::default();
        config.gallery.poll_ms = 0;
        assert!(config.validate().is_err());

        config.gallery.poll_ms = 3_000;
        assert!(config.validate().is_ok());

        config.viewer.grid_cols = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[gallery]
event_code = "EV01"
poll_ms = 2500
randomize = true

[pipeline]
print_enabled = false
"#
        )
        .unwrap();

        let config = BoothConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.gallery.event_code, "EV01");
        assert_eq!(config.gallery.poll_ms, 2500);
        assert!(config.gallery.randomize);
        assert!(!config.pipeline.print_enabled);
        assert_eq!(config.gallery.qr_prefixes, default_qr_prefixes());
        assert_eq!(config.viewer, ViewerSettings::default());
    }

    #[test]
    fn test_print_defaults_as_toml() {
        let rendered = toml::to_string_pretty(&BoothConfig::default()).unwrap();
        assert!(rendered.contains("[gallery]"));
        assert!(rendered.contains("poll_ms"));
    }
}
