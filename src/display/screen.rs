//! The presentation seam between the display loop and whatever owns the pixels.
use std::sync::Arc;

use crate::processing::layout::CanvasSize;
use crate::render::cache::Surface;

/// Exclusive output device driven by [`crate::display::state::DisplayLoop`].
///
/// Only the display thread calls into a screen, so implementations need no
/// internal locking.
pub trait Screen {
    /// Pixel size every frame must be composed at.
    fn canvas_size(&self) -> CanvasSize;

    /// Replace whatever is on screen with `frame`.
    fn show(&mut self, frame: &Arc<Surface>);

    /// Draw `to` over `from` at `alpha` (0 shows only `from`, 255 only `to`).
    fn blend(&mut self, from: &Arc<Surface>, to: &Arc<Surface>, alpha: u8);

    /// Empty-library state.
    fn show_placeholder(&mut self, message: &str);

    /// Hand the display to an external player.
    fn release(&mut self);

    /// Take the display back after [`Screen::release`].
    fn restore(&mut self);
}
