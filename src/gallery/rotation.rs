use super::types::MediaItem;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Circular step; an empty sequence always yields 0
pub fn advance(current: usize, total: usize, direction: Direction) -> usize {
    if total == 0 {
        return 0;
    }
    let current = current % total;
    match direction {
        Direction::Forward => (current + 1) % total,
        Direction::Backward => (current + total - 1) % total,
    }
}

/// Newest first, or one fresh shuffle when `randomize` is set.
///
/// Shuffling is not idempotent; call once per fetched batch.
pub fn order(items: Vec<MediaItem>, randomize: bool) -> Vec<MediaItem> {
    order_with_rng(items, randomize, &mut rand::thread_rng())
}

pub fn order_with_rng<R: Rng + ?Sized>(
    mut items: Vec<MediaItem>,
    randomize: bool,
    rng: &mut R,
) -> Vec<MediaItem> {
    if randomize {
        items.shuffle(rng);
    } else {
        // Stable; items without a timestamp sink to the end.
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
    items
}

/// Position in the rendered sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    index: usize,
    total: usize,
}

impl RotationCursor {
    pub fn new(total: usize) -> Self {
        Self { index: 0, total }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Rotation is disabled on an empty sequence
    pub fn is_enabled(&self) -> bool {
        self.total > 0
    }

    pub fn advance(&mut self, direction: Direction) -> usize {
        self.index = advance(self.index, self.total, direction);
        self.index
    }

    /// Resize, clamping rather than resetting so a shrinking list does not jump
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.index = if total == 0 {
            0
        } else {
            self.index.min(total - 1)
        };
    }

    pub fn jump_to(&mut self, index: usize) -> usize {
        if self.total > 0 {
            self.index = index.min(self.total - 1);
        }
        self.index
    }
}
