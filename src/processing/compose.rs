use config_model::{RenderConfig, RenderMode};
use image::{RgbImage, imageops};

use crate::processing::layout::{CanvasSize, center_offset, contain_size, cover_size};
use crate::processing::orientation::Orientation;
use crate::processing::padding::{Placement, paint_background};
use crate::processing::resize::scale_to;

/// Produce the exact `canvas`-sized frame for a decoded image.
///
/// Pure: the output depends only on the arguments, which is what lets the surface
/// cache key on them.
pub fn compose(
    source: &RgbImage,
    orientation: Orientation,
    canvas: CanvasSize,
    render: &RenderConfig,
) -> RgbImage {
    let oriented = orientation.apply_ref(source);
    let source = oriented.as_ref();
    if source.width() == 0 || source.height() == 0 {
        return RgbImage::new(canvas.width, canvas.height);
    }
    match render.mode {
        RenderMode::Cover => cover_crop(source, canvas),
        RenderMode::Contain => {
            let (w, h) = contain_size(canvas, source.width(), source.height());
            let main = scale_to(source, w, h);
            let (x, y) = center_offset(w, h, canvas.width, canvas.height);
            let placement = Placement {
                x,
                y,
                width: w,
                height: h,
            };
            let mut frame = paint_background(&render.padding, source, &main, placement, canvas);
            imageops::replace(&mut frame, &main, x as i64, y as i64);
            frame
        }
    }
}

/// Scale to fill the canvas and crop the centered canvas-sized region.
pub(crate) fn cover_crop(source: &RgbImage, canvas: CanvasSize) -> RgbImage {
    if source.width() == 0 || source.height() == 0 {
        return RgbImage::new(canvas.width, canvas.height);
    }
    let (w, h) = cover_size(canvas, source.width(), source.height());
    let scaled = scale_to(source, w, h);
    let (x, y) = center_offset(canvas.width, canvas.height, w, h);
    imageops::crop_imm(&scaled, x, y, canvas.width, canvas.height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_model::{HexColor, PaddingStyle};
    use image::Rgb;

    fn render(mode: RenderMode, style: PaddingStyle) -> RenderConfig {
        let mut cfg = RenderConfig::default();
        cfg.mode = mode;
        cfg.padding.style = style;
        cfg.padding.color = HexColor([0x11, 0x22, 0x33]);
        cfg
    }

    #[test]
    fn every_style_yields_exact_canvas() {
        let source = RgbImage::from_fn(37, 91, |x, y| Rgb([x as u8 * 5, y as u8, 77]));
        for canvas in [CanvasSize::new(64, 40), CanvasSize::new(40, 64), CanvasSize::new(1, 1)] {
            let out = compose(&source, Orientation::IDENTITY, canvas, &render(RenderMode::Cover, PaddingStyle::Solid));
            assert_eq!(out.dimensions(), (canvas.width, canvas.height));
            for style in PaddingStyle::ALL {
                let out = compose(
                    &source,
                    Orientation::from_exif(6),
                    canvas,
                    &render(RenderMode::Contain, style),
                );
                assert_eq!(out.dimensions(), (canvas.width, canvas.height), "{style}");
            }
        }
    }

    #[test]
    fn empty_source_is_black_canvas() {
        let out = compose(
            &RgbImage::new(0, 0),
            Orientation::IDENTITY,
            CanvasSize::new(8, 6),
            &render(RenderMode::Contain, PaddingStyle::Solid),
        );
        assert_eq!(out.dimensions(), (8, 6));
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn orientation_is_applied_before_framing() {
        // 40x20 red/blue halves rotated 90 CW become 20x40 red-top/blue-bottom
        let source = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        });
        let out = compose(
            &source,
            Orientation::from_exif(6),
            CanvasSize::new(20, 40),
            &render(RenderMode::Cover, PaddingStyle::Solid),
        );
        assert_eq!(out.get_pixel(10, 2)[0], 255);
        assert_eq!(out.get_pixel(10, 37)[2], 255);
    }
}
