mod autoplay;
mod classify;
mod engine;
mod rotation;
mod surface;
mod sync;
mod tiles;
mod types;

pub use autoplay::Autoplay;
pub use classify::{Classifier, ClassifierRules, FileClass};
pub use engine::{EngineOptions, GalleryEngine, ViewerLayout};
pub use rotation::{advance, order, order_with_rng, Direction, RotationCursor};
pub use surface::{GalleryView, LogSurface, MediaSurface, RecordingSurface, SurfaceCall};
pub use sync::GallerySync;
pub use tiles::{TileGrid, TileRect};
pub use types::{parse_timestamp, MediaItem, MediaKind, MediaRecord};
