use image::{RgbImage, imageops};

/// Gaussian blur of an RGB image. Large sigmas are applied to a downsampled
/// copy so cost stays bounded on full-screen canvases.
pub fn blur_rgb(image: &RgbImage, sigma: f32, max_sample_dim: u32) -> RgbImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    let factor = if longest > max_sample_dim && max_sample_dim > 0 {
        max_sample_dim as f32 / longest as f32
    } else {
        1.0
    };
    if factor >= 1.0 {
        return blur_full(image, sigma);
    }
    let sw = ((width as f32 * factor).round() as u32).max(1);
    let sh = ((height as f32 * factor).round() as u32).max(1);
    let small = imageops::resize(image, sw, sh, imageops::FilterType::Triangle);
    let blurred = blur_full(&small, sigma * factor);
    imageops::resize(&blurred, width, height, imageops::FilterType::Triangle)
}

fn blur_full(image: &RgbImage, sigma: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut channels: [Vec<f32>; 3] = std::array::from_fn(|c| {
        image.pixels().map(|p| p[c] as f32).collect::<Vec<f32>>()
    });
    for plane in &mut channels {
        blur_plane(plane, width as usize, height as usize, sigma);
    }
    let mut out = RgbImage::new(width, height);
    for (i, pixel) in out.pixels_mut().enumerate() {
        for c in 0..3 {
            pixel[c] = channels[c][i].round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Separable Gaussian blur of a single `width * height` plane, clamping at the edges.
pub fn blur_plane(data: &mut [f32], width: usize, height: usize, sigma: f32) {
    let (weights, radius) = gaussian_kernel(sigma);
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let radius = radius as isize;
    let mut tmp = vec![0.0f32; data.len()];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let sx = (x as isize + k as isize - radius).clamp(0, width as isize - 1);
                acc += row[sx as usize] * w;
            }
            tmp[y * width + x] = acc;
        }
    }
    for x in 0..width {
        for y in 0..height {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let sy = (y as isize + k as isize - radius).clamp(0, height as isize - 1);
                acc += tmp[sy as usize * width + x] * w;
            }
            data[y * width + x] = acc;
        }
    }
}

fn gaussian_kernel(sigma: f32) -> (Vec<f32>, u32) {
    let sigma = sigma.max(0.01);
    let radius = (sigma * 3.0).ceil() as i32;
    if radius <= 0 {
        return (vec![1.0], 0);
    }
    let mut weights = Vec::with_capacity((radius * 2 + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    let mut sum = 0.0;
    for i in -radius..=radius {
        let x = i as f32;
        let w = (-x * x / denom).exp();
        weights.push(w);
        sum += w;
    }
    if sum > 0.0 {
        for w in &mut weights {
            *w /= sum;
        }
    }
    (weights, radius as u32)
}
