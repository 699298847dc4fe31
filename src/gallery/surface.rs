use super::types::MediaItem;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

/// What the viewer should show right now
#[derive(Debug, Clone, PartialEq)]
pub enum GalleryView {
    /// Nothing to show; rendered as an explicit "no media" screen
    Empty,
    /// Single-item slideshow
    Single {
        item: MediaItem,
        qr_overlay: Option<String>,
        index: usize,
        total: usize,
    },
    /// One page of the multi-tile viewer
    Page {
        items: Vec<MediaItem>,
        reveal_delays: Vec<Duration>,
        fade: Duration,
        page: usize,
        pages: usize,
    },
}

impl GalleryView {
    pub fn is_empty(&self) -> bool {
        matches!(self, GalleryView::Empty)
    }

    /// Items currently on screen
    pub fn visible(&self) -> Vec<&MediaItem> {
        match self {
            GalleryView::Empty => Vec::new(),
            GalleryView::Single { item, .. } => vec![item],
            GalleryView::Page { items, .. } => items.iter().collect(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            GalleryView::Empty => "no media".to_string(),
            GalleryView::Single {
                item,
                index,
                total,
                qr_overlay,
            } => format!(
                "[{}/{}] {:?} {}{}",
                index + 1,
                total,
                item.kind,
                item.file_name,
                if qr_overlay.is_some() { " +qr" } else { "" }
            ),
            GalleryView::Page {
                items, page, pages, ..
            } => format!("page {}/{} ({} tiles)", page + 1, pages, items.len()),
        }
    }
}

/// Where the rotation engine sends frames and playback signals
pub trait MediaSurface: Send + Sync {
    fn render(&self, view: &GalleryView);
    fn play(&self, item: &MediaItem);
    fn pause(&self, item: &MediaItem);
}

/// Surface that writes frames to the log
pub struct LogSurface;

impl MediaSurface for LogSurface {
    fn render(&self, view: &GalleryView) {
        info!("Viewer: {}", view.summary());
    }

    fn play(&self, item: &MediaItem) {
        info!("Viewer: play {}", item.file_name);
    }

    fn pause(&self, item: &MediaItem) {
        info!("Viewer: pause {}", item.file_name);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Render(String),
    Play(String),
    Pause(String),
}

/// Surface that records every call, for tests
#[derive(Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    last_view: Mutex<Option<GalleryView>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn last_view(&self) -> Option<GalleryView> {
        self.last_view.lock().clone()
    }

    /// Play/pause calls only, in order
    pub fn playback(&self) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !matches!(c, SurfaceCall::Render(_)))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl MediaSurface for RecordingSurface {
    fn render(&self, view: &GalleryView) {
        self.calls.lock().push(SurfaceCall::Render(view.summary()));
        *self.last_view.lock() = Some(view.clone());
    }

    fn play(&self, item: &MediaItem) {
        self.calls.lock().push(SurfaceCall::Play(item.id.clone()));
    }

    fn pause(&self, item: &MediaItem) {
        self.calls.lock().push(SurfaceCall::Pause(item.id.clone()));
    }
}
