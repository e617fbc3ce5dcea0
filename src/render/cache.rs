//! Bounded LRU of ready-to-upload frames.
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use config_model::{HexColor, PaddingStyle, RenderConfig, RenderMode};
use image::RgbImage;
use lru::LruCache;

use crate::processing::layout::CanvasSize;

pub const DEFAULT_CAPACITY: usize = 6;

/// RGBA8 frame sized to the canvas, ready for texture upload.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Surface {
    pub fn from_rgb(frame: &RgbImage) -> Self {
        let mut pixels = Vec::with_capacity(frame.as_raw().len() / 3 * 4);
        for chunk in frame.as_raw().chunks_exact(3) {
            pixels.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }
        Self {
            width: frame.width(),
            height: frame.height(),
            pixels,
        }
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = [rgb[0], rgb[1], rgb[2], 255].repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Every input that changes what `compose` produces for a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub canvas: CanvasSize,
    pub mtime: Option<SystemTime>,
    pub mode: RenderMode,
    pub style: PaddingStyle,
    pub color: HexColor,
    pub blur_amount_bits: u32,
}

impl CacheKey {
    pub fn new(
        path: &Path,
        canvas: CanvasSize,
        mtime: Option<SystemTime>,
        render: &RenderConfig,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            canvas,
            mtime,
            mode: render.mode,
            style: render.padding.style,
            color: render.padding.color,
            blur_amount_bits: render.padding.blur_amount.to_bits(),
        }
    }
}

/// Not synchronized; [`crate::render::renderer::MediaRenderer`] serializes access.
pub struct SurfaceCache<K = CacheKey, V = Arc<Surface>> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V: Clone> SurfaceCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Return the cached value, promoting it, or run `factory` once and insert its result.
    pub fn get_or_compute(&mut self, key: K, factory: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let value = factory();
        self.entries.put(key, value.clone());
        value
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Membership test that leaves recency untouched.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::Cell;

    #[test]
    fn hit_skips_factory() {
        let mut cache: SurfaceCache<u32, Arc<String>> = SurfaceCache::new(DEFAULT_CAPACITY);
        let calls = Cell::new(0);
        let first = cache.get_or_compute(1, || {
            calls.set(calls.get() + 1);
            Arc::new("one".to_string())
        });
        let second = cache.get_or_compute(1, || {
            calls.set(calls.get() + 1);
            Arc::new("other".to_string())
        });
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn seventh_key_evicts_least_recent() {
        let mut cache: SurfaceCache<u32, u32> = SurfaceCache::new(6);
        for k in 0..6 {
            cache.get_or_compute(k, || k * 10);
        }
        // touch 0 so 1 becomes the oldest
        assert_eq!(cache.get_or_compute(0, || unreachable!()), 0);
        cache.get_or_compute(6, || 60);
        assert_eq!(cache.len(), 6);
        assert!(!cache.contains(&1));
        for k in [0, 2, 3, 4, 5, 6] {
            assert!(cache.contains(&k), "key {k} evicted");
        }
    }

    #[test]
    fn key_tracks_every_render_input() {
        let path = Path::new("/lib/a.jpg");
        let canvas = CanvasSize::new(800, 480);
        let base = RenderConfig::default();
        let key = CacheKey::new(path, canvas, None, &base);

        let mut mode = base;
        mode.mode = RenderMode::Cover;
        let mut style = base;
        style.padding.style = PaddingStyle::Mirror;
        let mut color = base;
        color.padding.color = HexColor::WHITE;
        let mut blur = base;
        blur.padding.blur_amount = 5.0;

        for changed in [mode, style, color, blur] {
            assert_ne!(key, CacheKey::new(path, canvas, None, &changed));
        }
        assert_ne!(key, CacheKey::new(path, CanvasSize::new(800, 481), None, &base));
        assert_ne!(
            key,
            CacheKey::new(path, canvas, Some(SystemTime::UNIX_EPOCH), &base)
        );
        assert_eq!(key, CacheKey::new(path, canvas, None, &base));
    }

    #[test]
    fn surface_conversion_adds_opaque_alpha() {
        let frame = RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]));
        let surface = Surface::from_rgb(&frame);
        assert_eq!(surface.pixels, vec![1, 2, 3, 255, 1, 2, 3, 255]);
        assert_eq!(surface.pixel(1, 0), [1, 2, 3, 255]);
        assert_eq!(Surface::solid(1, 2, [9, 8, 7]).pixels.len(), 8);
    }
}
