use image::{Rgb, RgbImage, imageops};

/// Largest side of the thumbnail the mean color is taken from.
const AVERAGE_SAMPLE_DIM: u32 = 32;

/// Mean color of a downsampled (at most 32x32) copy of `img`.
pub fn average_color(img: &RgbImage) -> Rgb<u8> {
    if img.width() == 0 || img.height() == 0 {
        return Rgb([0, 0, 0]);
    }
    let sample = if img.width() > AVERAGE_SAMPLE_DIM || img.height() > AVERAGE_SAMPLE_DIM {
        imageops::thumbnail(
            img,
            img.width().min(AVERAGE_SAMPLE_DIM),
            img.height().min(AVERAGE_SAMPLE_DIM),
        )
    } else {
        img.clone()
    };
    let mut accum = [0u64; 3];
    for pixel in sample.pixels() {
        for c in 0..3 {
            accum[c] += pixel[c] as u64;
        }
    }
    let total = (sample.width() as u64 * sample.height() as u64).max(1);
    Rgb([
        ((accum[0] + total / 2) / total) as u8,
        ((accum[1] + total / 2) / total) as u8,
        ((accum[2] + total / 2) / total) as u8,
    ])
}

/// Linear 8-bit blend: `amount` 0.0 keeps `from`, 1.0 yields `to`.
pub fn blend(from: Rgb<u8>, to: Rgb<u8>, amount: f32) -> Rgb<u8> {
    let t = amount.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8;
    Rgb([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])])
}

/// Blend every pixel of `img` toward `target` in place.
pub fn blend_toward(img: &mut RgbImage, target: Rgb<u8>, amount: f32) {
    for pixel in img.pixels_mut() {
        *pixel = blend(*pixel, target, amount);
    }
}
