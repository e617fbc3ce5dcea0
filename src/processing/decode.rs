//! Multi-backend decoding.
//!
//! Backends are tried in [`DecodeBackend::PREFERENCE`] order; any backend error falls
//! through to the next one. Only a file that cannot be stat'd, or that no backend can
//! decode, surfaces as [`Error::MediaUnavailable`].
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops};
use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};
use tracing::debug;

use crate::error::Error;
use crate::processing::layout::{CanvasSize, fit_scale};
use crate::processing::orientation::{Orientation, read_orientation};
use crate::processing::resize::resize_rgba;

/// Ceiling on the scaled JPEG denominator (libjpeg supports 1/1 through 1/8).
const MAX_JPEG_DENOMINATOR: u32 = 8;
/// How far above the canvas a decimated JPEG may stay before halving again.
const JPEG_OVERSHOOT: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeBackend {
    /// DCT-domain scaled JPEG decode.
    ScaledJpeg,
    /// Format-by-extension decode followed by a SIMD downscale.
    StreamingResize,
    /// Content-sniffed decode with no size limits, orientation applied inline.
    Universal,
}

impl DecodeBackend {
    pub const PREFERENCE: [Self; 3] = [Self::ScaledJpeg, Self::StreamingResize, Self::Universal];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ScaledJpeg => "scaled-jpeg",
            Self::StreamingResize => "streaming-resize",
            Self::Universal => "universal",
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        match self {
            Self::ScaledJpeg => matches!(
                path.extension()
                    .and_then(OsStr::to_str)
                    .map(|s| s.to_ascii_lowercase())
                    .as_deref(),
                Some("jpg" | "jpeg")
            ),
            Self::StreamingResize | Self::Universal => true,
        }
    }

    /// Whether the returned pixels already have EXIF orientation applied.
    pub fn applies_orientation(&self) -> bool {
        matches!(self, Self::Universal)
    }

    pub fn try_decode(&self, path: &Path, canvas: CanvasSize) -> Result<RgbImage> {
        match self {
            Self::ScaledJpeg => decode_scaled_jpeg(path, canvas),
            Self::StreamingResize => decode_streaming(path, canvas),
            Self::Universal => decode_universal(path, canvas),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: RgbImage,
    /// Orientation still to be applied to `pixels`.
    pub orientation: Orientation,
    pub backend: DecodeBackend,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    backends: Vec<DecodeBackend>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            backends: DecodeBackend::PREFERENCE.to_vec(),
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, path: &Path, canvas: CanvasSize) -> Result<DecodedImage, Error> {
        fs::metadata(path).map_err(|err| Error::media_unavailable(path, err))?;

        let mut last_err: Option<anyhow::Error> = None;
        for backend in self.backends.iter().filter(|b| b.supports(path)) {
            match backend.try_decode(path, canvas) {
                Ok(pixels) => {
                    let orientation = if backend.applies_orientation() {
                        Orientation::IDENTITY
                    } else {
                        read_orientation(path)
                    };
                    debug!(
                        backend = backend.name(),
                        width = pixels.width(),
                        height = pixels.height(),
                        path = %path.display(),
                        "decoded"
                    );
                    return Ok(DecodedImage {
                        pixels,
                        orientation,
                        backend: *backend,
                    });
                }
                Err(err) => {
                    debug!(
                        backend = backend.name(),
                        path = %path.display(),
                        "decode backend failed, falling through: {err:#}"
                    );
                    last_err = Some(err);
                }
            }
        }
        let source = last_err.unwrap_or_else(|| anyhow!("no decode backend accepts this file"));
        Err(Error::media_unavailable(path, source))
    }
}

/// Largest power-of-two denominator whose halving would still leave the image
/// more than 1.25x the canvas on some axis.
pub fn jpeg_denominator(src_w: u32, src_h: u32, canvas: CanvasSize) -> u32 {
    let limit_w = canvas.width as f64 * JPEG_OVERSHOOT;
    let limit_h = canvas.height as f64 * JPEG_OVERSHOOT;
    let mut denom = 1u32;
    while denom < MAX_JPEG_DENOMINATOR
        && ((src_w / (denom * 2)) as f64 > limit_w || (src_h / (denom * 2)) as f64 > limit_h)
    {
        denom *= 2;
    }
    denom
}

fn decode_scaled_jpeg(path: &Path, canvas: CanvasSize) -> Result<RgbImage> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut decoder = JpegDecoder::new(Cursor::new(data.as_slice()));
    decoder.read_info().context("failed to read JPEG header")?;
    let header = decoder
        .info()
        .ok_or_else(|| anyhow!("missing JPEG header info"))?;
    let (src_w, src_h) = (header.width as u32, header.height as u32);

    let denom = jpeg_denominator(src_w, src_h, canvas);
    let request_w = src_w.div_ceil(denom).clamp(1, u16::MAX as u32) as u16;
    let request_h = src_h.div_ceil(denom).clamp(1, u16::MAX as u32) as u16;
    let (expected_w, expected_h) = decoder
        .scale(request_w, request_h)
        .context("JPEG scaling rejected")?;
    let pixels = decoder.decode().context("JPEG decode failed")?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("missing JPEG info after decode"))?;

    let channels = match info.pixel_format {
        PixelFormat::RGB24 => 3,
        PixelFormat::L8 => 1,
        PixelFormat::CMYK32 => 4,
        PixelFormat::L16 => bail!("16-bit grayscale JPEGs are not supported by the scaled decoder"),
    };
    // Trust the decoder's reported shape over the requested one when they disagree,
    // provided the buffer actually holds that many pixels.
    let (width, height) = if (info.width, info.height) == (expected_w, expected_h) {
        (expected_w as u32, expected_h as u32)
    } else {
        debug!(
            expected = ?(expected_w, expected_h),
            actual = ?(info.width, info.height),
            "scaled JPEG shape mismatch; reshaping"
        );
        (info.width as u32, info.height as u32)
    };
    let needed = width as usize * height as usize * channels;
    if pixels.len() < needed || width == 0 || height == 0 {
        bail!(
            "scaled JPEG buffer holds {} bytes, expected {} for {}x{}",
            pixels.len(),
            needed,
            width,
            height
        );
    }
    let pixels = &pixels[..needed];

    let rgb = match info.pixel_format {
        PixelFormat::RGB24 => pixels.to_vec(),
        PixelFormat::L8 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
        PixelFormat::CMYK32 => pixels
            .chunks_exact(4)
            .flat_map(|chunk| {
                let k = chunk[3] as f32 / 255.0;
                let channel = |v: u8| {
                    let c = v as f32 / 255.0;
                    let c = c * (1.0 - k) + k;
                    ((1.0 - c) * 255.0).round().clamp(0.0, 255.0) as u8
                };
                [channel(chunk[0]), channel(chunk[1]), channel(chunk[2])]
            })
            .collect(),
        PixelFormat::L16 => bail!("16-bit grayscale JPEGs are not supported by the scaled decoder"),
    };
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("failed to construct RGB image for {}", path.display()))
}

fn decode_streaming(path: &Path, canvas: CanvasSize) -> Result<RgbImage> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("no streaming decoder for {}", path.display()))?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let img = ImageReader::with_format(BufReader::new(file), format)
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;

    let (w, h) = (img.width(), img.height());
    let scale = fit_scale(canvas, w, h);
    if scale < 1.0 {
        let tw = ((w as f64 * scale).round() as u32).max(1);
        let th = ((h as f64 * scale).round() as u32).max(1);
        let resized = resize_rgba(&img.into_rgba8(), tw, th)?;
        Ok(DynamicImage::ImageRgba8(resized).into_rgb8())
    } else {
        Ok(img.into_rgb8())
    }
}

fn decode_universal(path: &Path, canvas: CanvasSize) -> Result<RgbImage> {
    let mut reader = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()?;
    reader.no_limits();
    let img = reader
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?
        .into_rgb8();
    let img = read_orientation(path).apply(img);

    let (w, h) = img.dimensions();
    let scale = fit_scale(canvas, w, h);
    if scale < 1.0 {
        let tw = ((w as f64 * scale).round() as u32).max(1);
        let th = ((h as f64 * scale).round() as u32).max(1);
        Ok(imageops::resize(&img, tw, th, imageops::FilterType::Triangle))
    } else {
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn denominator_tracks_canvas() {
        let canvas = CanvasSize::new(800, 480);
        assert_eq!(jpeg_denominator(800, 480, canvas), 1);
        assert_eq!(jpeg_denominator(1600, 960, canvas), 1);
        assert_eq!(jpeg_denominator(2400, 1200, canvas), 2);
        assert_eq!(jpeg_denominator(4800, 2400, canvas), 4);
        assert_eq!(jpeg_denominator(8000, 6000, canvas), 8);
        assert_eq!(jpeg_denominator(64_000, 48_000, canvas), 8);
    }

    #[test]
    fn scaled_jpeg_backend_decimates_large_sources() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("big.jpg");
        gradient(1024, 512).save(&path).unwrap();
        let canvas = CanvasSize::new(200, 100);
        let decoded = Decoder::new().decode(&path, canvas).unwrap();
        assert_eq!(decoded.backend, DecodeBackend::ScaledJpeg);
        assert_eq!(decoded.pixels.dimensions(), (256, 128));
        assert!(decoded.orientation.is_identity());
    }

    #[test]
    fn streaming_backend_downscales_png_and_keeps_small_ones() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("wide.png");
        gradient(400, 100).save(&path).unwrap();
        let decoded = Decoder::new()
            .decode(&path, CanvasSize::new(200, 200))
            .unwrap();
        assert_eq!(decoded.backend, DecodeBackend::StreamingResize);
        assert_eq!(decoded.pixels.dimensions(), (200, 50));

        let decoded = Decoder::new()
            .decode(&path, CanvasSize::new(1000, 1000))
            .unwrap();
        assert_eq!(decoded.pixels.dimensions(), (400, 100));
    }

    #[test]
    fn mislabeled_file_falls_through_to_universal() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("actually-png.jpg");
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(gradient(40, 20))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        fs::write(&path, bytes).unwrap();
        let decoded = Decoder::new()
            .decode(&path, CanvasSize::new(20, 20))
            .unwrap();
        assert_eq!(decoded.backend, DecodeBackend::Universal);
        assert_eq!(decoded.pixels.dimensions(), (20, 10));
    }

    #[test]
    fn missing_file_is_media_unavailable() {
        let tmp = tempdir().unwrap();
        let err = Decoder::new()
            .decode(&tmp.path().join("gone.jpg"), CanvasSize::new(10, 10))
            .unwrap_err();
        assert!(err.is_media_unavailable());
    }

    #[test]
    fn garbage_is_media_unavailable_after_all_backends() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("noise.jpg");
        fs::write(&path, b"definitely not an image").unwrap();
        let err = Decoder::new()
            .decode(&path, CanvasSize::new(10, 10))
            .unwrap_err();
        assert!(err.is_media_unavailable());
    }

    #[test]
    fn backend_support_is_extension_based() {
        assert!(DecodeBackend::ScaledJpeg.supports(Path::new("x.JPEG")));
        assert!(!DecodeBackend::ScaledJpeg.supports(Path::new("x.png")));
        assert!(DecodeBackend::Universal.supports(Path::new("x.whatever")));
    }
}
