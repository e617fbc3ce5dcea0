//! Empty-library message rasterized on the CPU into a [`Surface`].
use ab_glyph::{Font, FontArc, FontVec, PxScale, ScaleFont, point};
use config_model::ScreenMessageConfig;
use fontdb::{Database, Family, Query};
use tracing::{debug, warn};

use crate::processing::layout::CanvasSize;
use crate::render::cache::Surface;

/// Text never runs wider than this share of the canvas.
const MAX_LINE_FRACTION: f32 = 0.9;

pub struct PlaceholderPainter {
    font: Option<FontArc>,
    font_size: f32,
    background: [u8; 3],
    foreground: [u8; 3],
}

impl PlaceholderPainter {
    /// Resolve the configured font (or the system sans-serif) once up front.
    pub fn new(cfg: &ScreenMessageConfig) -> Self {
        let font = match cfg.font.as_deref() {
            Some(name) => load_system_font(Some(name)).or_else(|| {
                warn!(font = name, "placeholder font not found; using system default");
                load_system_font(None)
            }),
            None => load_system_font(None),
        };
        if font.is_none() {
            warn!("no system font available; placeholder text will not be drawn");
        }
        Self::with_font(font, cfg)
    }

    pub fn with_font(font: Option<FontArc>, cfg: &ScreenMessageConfig) -> Self {
        Self {
            font,
            font_size: cfg.effective_font_size(),
            background: cfg.colors.background.0,
            foreground: cfg.colors.font.0,
        }
    }

    pub fn paint(&self, message: &str, canvas: CanvasSize) -> Surface {
        let mut surface = Surface::solid(canvas.width, canvas.height, self.background);
        let Some(font) = &self.font else {
            return surface;
        };
        let scale = PxScale::from(self.font_size);
        let scaled = font.as_scaled(scale);
        let lines = wrap(&scaled, message, canvas.width as f32 * MAX_LINE_FRACTION);
        let line_height = scaled.height() + scaled.line_gap();
        let block_height = line_height * lines.len() as f32;
        let mut baseline = (canvas.height as f32 - block_height) / 2.0 + scaled.ascent();

        for line in &lines {
            let mut x = (canvas.width as f32 - line_width(&scaled, line)) / 2.0;
            let mut previous = None;
            for ch in line.chars() {
                let id = scaled.glyph_id(ch);
                if let Some(prev) = previous {
                    x += scaled.kern(prev, id);
                }
                previous = Some(id);
                let glyph = id.with_scale_and_position(scale, point(x, baseline));
                x += scaled.h_advance(id);
                let Some(outlined) = font.outline_glyph(glyph) else {
                    continue;
                };
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i64 + gx as i64;
                    let py = bounds.min.y as i64 + gy as i64;
                    cover_pixel(&mut surface, px, py, self.foreground, coverage);
                });
            }
            baseline += line_height;
        }
        debug!(lines = lines.len(), "placeholder painted");
        surface
    }
}

fn cover_pixel(surface: &mut Surface, x: i64, y: i64, color: [u8; 3], coverage: f32) {
    if x < 0 || y < 0 || x >= surface.width as i64 || y >= surface.height as i64 {
        return;
    }
    let i = (y as usize * surface.width as usize + x as usize) * 4;
    let a = coverage.clamp(0.0, 1.0);
    for c in 0..3 {
        let under = surface.pixels[i + c] as f32;
        surface.pixels[i + c] = (under + (color[c] as f32 - under) * a).round() as u8;
    }
}

fn line_width<F: Font, SF: ScaleFont<F>>(scaled: &SF, line: &str) -> f32 {
    let mut width = 0.0;
    let mut previous = None;
    for ch in line.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        previous = Some(id);
    }
    width
}

/// Greedy word wrap. A single word wider than `max_width` gets its own line.
fn wrap<F: Font, SF: ScaleFont<F>>(scaled: &SF, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if line.is_empty() || line_width(scaled, &candidate) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// `name` matches a family name; `None` asks for the default sans-serif face.
fn load_system_font(name: Option<&str>) -> Option<FontArc> {
    let mut db = Database::new();
    db.load_system_fonts();
    let families = [name.map_or(Family::SansSerif, Family::Name)];
    let query = Query {
        families: &families,
        ..Query::default()
    };
    let face_id = match db.query(&query) {
        Some(id) => id,
        None if name.is_none() => db.faces().next()?.id,
        None => return None,
    };
    db.with_face_data(face_id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index)
            .ok()
            .map(FontArc::new)
    })?
}
