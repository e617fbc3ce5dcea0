use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{RgbImage, RgbaImage, imageops};

/// High-quality (Lanczos3) resize. Runs through the RGBA path of the SIMD resizer.
pub fn resize_rgb(source: &RgbImage, target_w: u32, target_h: u32) -> Result<RgbImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }
    let rgba = image::DynamicImage::ImageRgb8(source.clone()).into_rgba8();
    let resized = resize_rgba(&rgba, target_w, target_h)?;
    Ok(image::DynamicImage::ImageRgba8(resized).into_rgb8())
}

pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}

/// Like [`resize_rgb`] but never fails: falls back to the `image` crate's Lanczos3.
pub fn scale_to(source: &RgbImage, target_w: u32, target_h: u32) -> RgbImage {
    let target_w = target_w.max(1);
    let target_h = target_h.max(1);
    resize_rgb(source, target_w, target_h).unwrap_or_else(|err| {
        tracing::debug!("simd resize failed, using fallback: {err:#}");
        imageops::resize(source, target_w, target_h, imageops::FilterType::Lanczos3)
    })
}
