/// Target surface size in pixels. Both sides are at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// Scaled size that fills the canvas on both axes; at least the canvas size.
pub fn cover_size(canvas: CanvasSize, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas.width as f64;
    let ch = canvas.height as f64;
    let scale = (cw / iw).max(ch / ih);
    let w = (iw * scale).round().max(cw);
    let h = (ih * scale).round().max(ch);
    (w as u32, h as u32)
}

/// Scaled size that fits inside the canvas; never zero, never larger than the canvas.
pub fn contain_size(canvas: CanvasSize, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas.width as f64;
    let ch = canvas.height as f64;
    let scale = (cw / iw).min(ch / ih);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw);
    let h = (ih * scale).round().clamp(1.0, ch);
    (w as u32, h as u32)
}

/// Downscale factor that fits the source inside the canvas without enlarging it.
pub fn fit_scale(canvas: CanvasSize, src_w: u32, src_h: u32) -> f64 {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    (canvas.width as f64 / iw)
        .min(canvas.height as f64 / ih)
        .min(1.0)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
