//! Bitmap cleanup before recognition.
//!
//! Table rules are emphasized with horizontal and vertical morphological
//! openings, blended back into the page, denoised with a bilateral filter
//! and binarized with a Gaussian adaptive threshold.

use image::{GrayImage, ImageBuffer, Luma};

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    /// Length of the line-shaped structuring elements (25 means 25x1 and 1x25)
    pub line_kernel: u32,
    pub open_iterations: u32,
    /// Weight of the source image when blending in the detected lines
    pub source_weight: f32,
    pub bilateral_diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
    /// Odd neighbourhood size for the adaptive threshold
    pub threshold_block: u32,
    pub threshold_c: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            line_kernel: 25,
            open_iterations: 2,
            source_weight: 0.7,
            bilateral_diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
            threshold_block: 11,
            threshold_c: 2.0,
        }
    }
}

pub fn preprocess_for_ocr(image: &GrayImage) -> GrayImage {
    preprocess_with(image, &PreprocessOptions::default())
}

pub fn preprocess_with(image: &GrayImage, opts: &PreprocessOptions) -> GrayImage {
    let horizontal = morph_open(image, opts.line_kernel, 1, opts.open_iterations);
    let vertical = morph_open(image, 1, opts.line_kernel, opts.open_iterations);
    let lines = add_weighted(&horizontal, 0.5, &vertical, 0.5);
    let enhanced = add_weighted(image, opts.source_weight, &lines, 1.0 - opts.source_weight);
    let denoised = bilateral_filter(&enhanced, opts.bilateral_diameter, opts.sigma_color, opts.sigma_space);
    adaptive_threshold_gaussian(&denoised, opts.threshold_block, opts.threshold_c)
}

/// Erosion followed by dilation with a `kw` x `kh` rectangle, each applied
/// `iterations` times.
pub fn morph_open(image: &GrayImage, kw: u32, kh: u32, iterations: u32) -> GrayImage {
    let mut out = image.clone();
    for _ in 0..iterations {
        out = rank_filter(&out, kw, kh, u8::min);
    }
    for _ in 0..iterations {
        out = rank_filter(&out, kw, kh, u8::max);
    }
    out
}

/// Separable min/max filter over a rectangle centred on each pixel, clipped at the borders.
fn rank_filter(image: &GrayImage, kw: u32, kh: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut current = image.clone();
    if w == 0 || h == 0 {
        return current;
    }
    if kw > 1 {
        let r = kw / 2;
        let src = current.clone();
        current = ImageBuffer::from_fn(w, h, |x, y| {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            let v = (lo..=hi)
                .map(|xx| src.get_pixel(xx, y)[0])
                .reduce(pick)
                .unwrap_or(0);
            Luma([v])
        });
    }
    if kh > 1 {
        let r = kh / 2;
        let src = current.clone();
        current = ImageBuffer::from_fn(w, h, |x, y| {
            let lo = y.saturating_sub(r);
            let hi = (y + r).min(h - 1);
            let v = (lo..=hi)
                .map(|yy| src.get_pixel(x, yy)[0])
                .reduce(pick)
                .unwrap_or(0);
            Luma([v])
        });
    }
    current
}

/// `a * wa + b * wb`, saturated to `u8`. Both images must share dimensions.
pub fn add_weighted(a: &GrayImage, wa: f32, b: &GrayImage, wb: f32) -> GrayImage {
    ImageBuffer::from_fn(a.width(), a.height(), |x, y| {
        let va = a.get_pixel(x, y)[0] as f32;
        let vb = b.get_pixel(x, y)[0] as f32;
        Luma([(va * wa + vb * wb).round().clamp(0.0, 255.0) as u8])
    })
}

/// Edge-preserving smoothing over a circular window of the given diameter.
pub fn bilateral_filter(image: &GrayImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    let radius = (diameter / 2) as i64;

    let color_weight: Vec<f32> = (0..256)
        .map(|d| {
            let d = d as f32;
            (-(d * d) / (2.0 * sigma_color * sigma_color)).exp()
        })
        .collect();
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f32;
            if dist2 <= (radius * radius) as f32 {
                offsets.push((dx, dy, (-dist2 / (2.0 * sigma_space * sigma_space)).exp()));
            }
        }
    }

    ImageBuffer::from_fn(w, h, |x, y| {
        let center = image.get_pixel(x, y)[0];
        let mut sum = 0.0f32;
        let mut norm = 0.0f32;
        for &(dx, dy, spatial) in &offsets {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                continue;
            }
            let v = image.get_pixel(nx as u32, ny as u32)[0];
            let weight = spatial * color_weight[center.abs_diff(v) as usize];
            sum += weight * v as f32;
            norm += weight;
        }
        let value = if norm > 0.0 { sum / norm } else { center as f32 };
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binary threshold against a Gaussian-weighted local mean minus `c`.
pub fn adaptive_threshold_gaussian(image: &GrayImage, block: u32, c: f32) -> GrayImage {
    let block = if block % 2 == 0 { block + 1 } else { block };
    let block = block.max(3);
    let kernel = gaussian_kernel(block);
    let mean = separable_blur(image, &kernel);
    let (w, _) = image.dimensions();
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let local = mean[(y * w + x) as usize];
        let v = image.get_pixel(x, y)[0] as f32;
        Luma([if v > local - c { 255 } else { 0 }])
    })
}

/// Normalized 1-D Gaussian with the sigma OpenCV derives from the size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let raw: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Blur with a separable kernel, renormalizing where the window leaves the image.
fn separable_blur(image: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let half = (kernel.len() / 2) as i64;
    let mut horizontal = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let (mut sum, mut norm) = (0.0, 0.0);
            for (k, weight) in kernel.iter().enumerate() {
                let xx = x + k as i64 - half;
                if (0..w).contains(&xx) {
                    sum += weight * image.get_pixel(xx as u32, y as u32)[0] as f32;
                    norm += weight;
                }
            }
            horizontal[(y * w + x) as usize] = sum / norm;
        }
    }
    let mut out = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let (mut sum, mut norm) = (0.0, 0.0);
            for (k, weight) in kernel.iter().enumerate() {
                let yy = y + k as i64 - half;
                if (0..h).contains(&yy) {
                    sum += weight * horizontal[(yy * w + x) as usize];
                    norm += weight;
                }
            }
            out[(y * w + x) as usize] = sum / norm;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_binary_and_same_size() {
        let img = ImageBuffer::from_fn(60, 40, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let out = preprocess_for_ocr(&img);
        assert_eq!(out.dimensions(), (60, 40));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_tiny_image_smaller_than_kernels() {
        let img = GrayImage::from_pixel(3, 2, Luma([200]));
        let out = preprocess_for_ocr(&img);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_uniform_page_stays_white() {
        let img = GrayImage::from_pixel(30, 30, Luma([255]));
        assert_eq!(morph_open(&img, 25, 1, 2), img);
        assert_eq!(bilateral_filter(&img, 9, 75.0, 75.0), img);
        assert!(preprocess_for_ocr(&img).pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_opening_removes_thin_bright_gap() {
        // a 1px white column inside a dark row disappears under a 25x1 opening
        let mut img = GrayImage::from_pixel(40, 5, Luma([0]));
        for y in 0..5 {
            img.put_pixel(20, y, Luma([255]));
        }
        let out = morph_open(&img, 25, 1, 1);
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_threshold_marks_dark_ink() {
        let mut img = GrayImage::from_pixel(21, 21, Luma([230]));
        img.put_pixel(10, 10, Luma([20]));
        let out = adaptive_threshold_gaussian(&img, 11, 2.0);
        assert_eq!(out.get_pixel(10, 10)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }
}
