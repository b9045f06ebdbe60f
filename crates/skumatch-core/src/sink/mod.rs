pub mod dir;
mod ooxml;
pub mod target;
pub mod xlsx;

pub use dir::{DirectorySink, Manifest, ManifestEntry};
pub use target::WriteTarget;
pub use xlsx::WorkbookSink;

/// Points per pixel at 96 dpi, for sizing rows to their image.
pub(crate) const POINTS_PER_PIXEL: f32 = 0.75;
