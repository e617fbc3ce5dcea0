//! Backgrounds painted behind a contained image.
use config_model::{PaddingConfig, PaddingStyle};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::processing::blur::{blur_plane, blur_rgb};
use crate::processing::color::{average_color, blend, blend_toward};
use crate::processing::compose::cover_crop;
use crate::processing::layout::CanvasSize;

const BLUR_DARKEN: f32 = 0.08;
const GLASS_LIGHTEN: f32 = 0.06;
const DIM_DARKEN: f32 = 0.40;
const MOTION_SHIFTS: [i64; 5] = [-4, -2, 0, 2, 4];
const TEXTURE_SIGMA: f32 = 8.0;
const TEXTURE_SEED: u64 = 0x1EAF_F4A3;
/// Standard deviation, in 8-bit levels, of the smoothed texture noise.
const TEXTURE_AMPLITUDE: f32 = 10.0;
/// Blurred backgrounds are computed at most this large, then upscaled.
const BLUR_SAMPLE_DIM: u32 = 320;

/// Where the contained image sits inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Paint the full-canvas background for `style`. `source` is the oriented,
/// unscaled image and `main` the contained copy placed at `placement`.
pub fn paint_background(
    padding: &PaddingConfig,
    source: &RgbImage,
    main: &RgbImage,
    placement: Placement,
    canvas: CanvasSize,
) -> RgbImage {
    let (cw, ch) = (canvas.width, canvas.height);
    let color = Rgb(padding.color.0);
    match padding.style {
        PaddingStyle::Solid => RgbImage::from_pixel(cw, ch, color),
        PaddingStyle::Blur => {
            let mut bg = blur_rgb(
                &cover_crop(source, canvas),
                padding.effective_blur_radius(),
                BLUR_SAMPLE_DIM,
            );
            blend_toward(&mut bg, Rgb([0, 0, 0]), BLUR_DARKEN);
            bg
        }
        PaddingStyle::Glass => {
            let mut bg = blur_rgb(
                &cover_crop(source, canvas),
                padding.effective_blur_radius(),
                BLUR_SAMPLE_DIM,
            );
            blend_toward(&mut bg, Rgb([255, 255, 255]), GLASS_LIGHTEN);
            bg
        }
        PaddingStyle::Average => RgbImage::from_pixel(cw, ch, average_color(source)),
        PaddingStyle::Dim => {
            let dimmed = blend(average_color(source), Rgb([0, 0, 0]), DIM_DARKEN);
            RgbImage::from_pixel(cw, ch, dimmed)
        }
        PaddingStyle::Mirror => mirror(main, placement, canvas),
        PaddingStyle::Stretch => stretch(main, placement, canvas),
        PaddingStyle::GradientLinear => {
            let start = average_color(source);
            let span = ch.saturating_sub(1).max(1) as f32;
            RgbImage::from_fn(cw, ch, |_, y| blend(start, color, y as f32 / span))
        }
        PaddingStyle::GradientRadial => {
            let start = average_color(source);
            let cx = (cw as f32 - 1.0) / 2.0;
            let cy = (ch as f32 - 1.0) / 2.0;
            let corner = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);
            RgbImage::from_fn(cw, ch, |x, y| {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                blend(start, color, (dx * dx + dy * dy).sqrt() / corner)
            })
        }
        PaddingStyle::Motion => motion(&cover_crop(source, canvas)),
        PaddingStyle::Texture => texture(average_color(source), canvas),
    }
}

/// Index into `0..len` reflecting at both edges with period `2 * len`.
fn reflect(i: i64, len: u32) -> u32 {
    let n = len.max(1) as i64;
    let m = i.rem_euclid(2 * n);
    if m < n { m as u32 } else { (2 * n - 1 - m) as u32 }
}

fn mirror(main: &RgbImage, placement: Placement, canvas: CanvasSize) -> RgbImage {
    let (mw, mh) = main.dimensions();
    RgbImage::from_fn(canvas.width, canvas.height, |x, y| {
        let mx = reflect(x as i64 - placement.x as i64, mw);
        let my = reflect(y as i64 - placement.y as i64, mh);
        *main.get_pixel(mx, my)
    })
}

fn stretch(main: &RgbImage, placement: Placement, canvas: CanvasSize) -> RgbImage {
    let (mw, mh) = main.dimensions();
    RgbImage::from_fn(canvas.width, canvas.height, |x, y| {
        let mx = (x as i64 - placement.x as i64).clamp(0, mw.max(1) as i64 - 1);
        let my = (y as i64 - placement.y as i64).clamp(0, mh.max(1) as i64 - 1);
        *main.get_pixel(mx as u32, my as u32)
    })
}

fn motion(base: &RgbImage) -> RgbImage {
    let (w, h) = base.dimensions();
    let last = w.max(1) as i64 - 1;
    RgbImage::from_fn(w, h, |x, y| {
        let mut acc = [0u32; 3];
        for shift in MOTION_SHIFTS {
            let sx = (x as i64 + shift).clamp(0, last) as u32;
            let p = base.get_pixel(sx, y);
            for c in 0..3 {
                acc[c] += p[c] as u32;
            }
        }
        let n = MOTION_SHIFTS.len() as u32;
        Rgb([
            ((acc[0] + n / 2) / n) as u8,
            ((acc[1] + n / 2) / n) as u8,
            ((acc[2] + n / 2) / n) as u8,
        ])
    })
}

fn texture(base: Rgb<u8>, canvas: CanvasSize) -> RgbImage {
    let (w, h) = (canvas.width as usize, canvas.height as usize);
    let mut rng = StdRng::seed_from_u64(TEXTURE_SEED);
    let mut noise: Vec<f32> = (0..w * h).map(|_| standard_normal(&mut rng)).collect();
    blur_plane(&mut noise, w, h, TEXTURE_SIGMA);

    let mean = noise.iter().sum::<f32>() / noise.len().max(1) as f32;
    let variance =
        noise.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / noise.len().max(1) as f32;
    let gain = if variance > f32::EPSILON {
        TEXTURE_AMPLITUDE / variance.sqrt()
    } else {
        0.0
    };

    RgbImage::from_fn(canvas.width, canvas.height, |x, y| {
        let n = (noise[y as usize * w + x as usize] - mean) * gain;
        let shade = |c: u8| (c as f32 + n).round().clamp(0.0, 255.0) as u8;
        Rgb([shade(base[0]), shade(base[1]), shade(base[2])])
    })
}

/// Box-Muller sample from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.random::<f32>().max(f32::MIN_POSITIVE);
    let u2: f32 = rng.random::<f32>();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}
