use super::rotation::{order, Direction, RotationCursor};
use super::surface::{GalleryView, MediaSurface};
use super::tiles::TileGrid;
use super::types::MediaItem;
use crate::events::{BoothEvent, EventBus};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// How the viewer lays items out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerLayout {
    /// One item at a time
    Slideshow,
    /// Pages of `cols x rows` tiles
    Tiles(TileGrid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub randomize: bool,
    pub show_qr: bool,
}

#[derive(Default)]
struct EngineState {
    items: Vec<MediaItem>,
    cursor: RotationCursor,
    batch_signature: Option<u64>,
    playing: Vec<MediaItem>,
}

struct Presentation {
    view: GalleryView,
    pause: Vec<MediaItem>,
    play: Vec<MediaItem>,
    cursor: RotationCursor,
}

/// Ordered media sequence plus the rotation cursor over it
pub struct GalleryEngine {
    layout: ViewerLayout,
    options: EngineOptions,
    surface: Arc<dyn MediaSurface>,
    event_bus: Option<Arc<EventBus>>,
    state: Mutex<EngineState>,
}

impl GalleryEngine {
    pub fn new(layout: ViewerLayout, options: EngineOptions, surface: Arc<dyn MediaSurface>) -> Self {
        Self {
            layout,
            options,
            surface,
            event_bus: None,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn layout(&self) -> ViewerLayout {
        self.layout
    }

    /// Replace the sequence with a freshly classified batch.
    ///
    /// An unchanged batch keeps its current order, so a shuffled gallery is
    /// shuffled once per new batch and never on redisplay. Returns whether
    /// anything changed.
    pub fn apply_batch(&self, items: Vec<MediaItem>) -> bool {
        let signature = batch_signature(&items);

        let presentation = {
            let mut state = self.state.lock();
            if state.batch_signature == Some(signature) {
                debug!("Gallery batch unchanged ({} items)", items.len());
                return false;
            }

            state.items = order(items, self.options.randomize);
            state.batch_signature = Some(signature);
            let units = self.unit_count(state.items.len());
            state.cursor.set_total(units);
            self.prepare(&mut state)
        };

        self.present(presentation);
        true
    }

    /// Move the cursor one unit; a no-op on an empty gallery
    pub fn step(&self, direction: Direction) -> usize {
        let presentation = {
            let mut state = self.state.lock();
            if !state.cursor.is_enabled() {
                return 0;
            }
            state.cursor.advance(direction);
            self.prepare(&mut state)
        };

        let index = presentation.cursor.index();
        self.present(presentation);
        index
    }

    pub fn jump_to(&self, index: usize) -> usize {
        let presentation = {
            let mut state = self.state.lock();
            state.cursor.jump_to(index);
            self.prepare(&mut state)
        };

        let index = presentation.cursor.index();
        self.present(presentation);
        index
    }

    pub fn view(&self) -> GalleryView {
        let state = self.state.lock();
        self.view_of(&state)
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.state.lock().items.clone()
    }

    pub fn cursor(&self) -> RotationCursor {
        self.state.lock().cursor
    }

    fn unit_count(&self, items: usize) -> usize {
        match &self.layout {
            ViewerLayout::Slideshow => items,
            ViewerLayout::Tiles(grid) => grid.page_count(items),
        }
    }

    fn view_of(&self, state: &EngineState) -> GalleryView {
        if state.items.is_empty() {
            return GalleryView::Empty;
        }

        let index = state.cursor.index();
        match &self.layout {
            ViewerLayout::Slideshow => {
                let item = state.items[index].clone();
                let qr_overlay = if self.options.show_qr {
                    item.qrcode_url.clone()
                } else {
                    None
                };
                GalleryView::Single {
                    item,
                    qr_overlay,
                    index,
                    total: state.cursor.total(),
                }
            }
            ViewerLayout::Tiles(grid) => {
                let items = grid.page(&state.items, index).to_vec();
                let reveal_delays = (0..items.len()).map(|i| grid.stagger_delay(i)).collect();
                GalleryView::Page {
                    items,
                    reveal_delays,
                    fade: grid.fade(),
                    page: index,
                    pages: state.cursor.total(),
                }
            }
        }
    }

    fn prepare(&self, state: &mut EngineState) -> Presentation {
        let view = self.view_of(state);

        let visible_videos: Vec<MediaItem> = view
            .visible()
            .into_iter()
            .filter(|item| item.is_video())
            .cloned()
            .collect();

        let now: HashSet<&str> = visible_videos.iter().map(|i| i.id.as_str()).collect();
        let before: HashSet<&str> = state.playing.iter().map(|i| i.id.as_str()).collect();

        let pause = state
            .playing
            .iter()
            .filter(|i| !now.contains(i.id.as_str()))
            .cloned()
            .collect();
        let play = visible_videos
            .iter()
            .filter(|i| !before.contains(i.id.as_str()))
            .cloned()
            .collect();

        state.playing = visible_videos;

        Presentation {
            view,
            pause,
            play,
            cursor: state.cursor,
        }
    }

    fn present(&self, presentation: Presentation) {
        for item in &presentation.pause {
            self.surface.pause(item);
            self.emit(BoothEvent::PlaybackChanged {
                item_id: item.id.clone(),
                playing: false,
            });
        }

        self.surface.render(&presentation.view);
        self.emit(BoothEvent::CursorMoved {
            index: presentation.cursor.index(),
            total: presentation.cursor.total(),
        });

        for item in &presentation.play {
            self.surface.play(item);
            self.emit(BoothEvent::PlaybackChanged {
                item_id: item.id.clone(),
                playing: true,
            });
        }
    }

    fn emit(&self, event: BoothEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}

/// Order-independent fingerprint of a batch
fn batch_signature(items: &[MediaItem]) -> u64 {
    let mut keys: Vec<_> = items
        .iter()
        .map(|i| {
            (
                i.id.as_str(),
                i.updated_at.map(|t| t.timestamp_millis()),
                i.media_url.as_str(),
                i.qrcode_url.as_deref(),
            )
        })
        .collect();
    keys.sort();

    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}
