use super::types::MediaItem;
use crate::settings::ViewerSettings;
use serde::Serialize;
use std::time::Duration;

/// Screen rectangle of one tile, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TileRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fixed-aspect grid for the multi-tile viewer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    settings: ViewerSettings,
}

impl TileGrid {
    pub fn new(settings: ViewerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn tile_count(&self) -> usize {
        self.settings.tile_count().max(1)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.settings.fade_ms)
    }

    /// Reveal delay of the tile at `index`
    pub fn stagger_delay(&self, index: usize) -> Duration {
        Duration::from_millis(self.settings.stagger_ms.saturating_mul(index as u64))
    }

    pub fn page_count(&self, items: usize) -> usize {
        items.div_ceil(self.tile_count())
    }

    pub fn page<'a>(&self, items: &'a [MediaItem], page: usize) -> &'a [MediaItem] {
        let start = page.saturating_mul(self.tile_count()).min(items.len());
        let end = (start + self.tile_count()).min(items.len());
        &items[start..end]
    }

    /// Row-major tile rectangles inside the margins of a `width` x `height` viewport
    pub fn layout(&self, width: u32, height: u32) -> Vec<TileRect> {
        let s = &self.settings;
        let cols = s.grid_cols.max(1);
        let rows = s.grid_rows.max(1);
        let gap = s.grid_gap_px as f32;

        let inner_w = width.saturating_sub(s.margin_left_px + s.margin_right_px) as f32;
        let inner_h = height.saturating_sub(s.margin_top_px + s.margin_bottom_px) as f32;

        let tile_w = ((inner_w - gap * (cols - 1) as f32) / cols as f32).max(0.0);
        let tile_h = ((inner_h - gap * (rows - 1) as f32) / rows as f32).max(0.0);

        (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (row, col)))
            .map(|(row, col)| TileRect {
                x: s.margin_left_px as f32 + col as f32 * (tile_w + gap),
                y: s.margin_top_px as f32 + row as f32 * (tile_h + gap),
                width: tile_w,
                height: tile_h,
            })
            .collect()
    }
}
