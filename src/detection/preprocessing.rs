use image::{GrayImage, Luma, RgbaImage};

use crate::config::PreprocessConfig;
use crate::models::{BinaryMask, RasterImage};

/// Turn a diagram raster into a foreground mask at full resolution.
/// Each step allocates a new buffer; zero-area input gives an empty mask.
pub fn preprocess(image: &RasterImage, config: &PreprocessConfig) -> BinaryMask {
    let (width, height) = image.dimensions();
    if image.is_empty() {
        return BinaryMask::empty(width, height);
    }

    let gray = to_grayscale(image.pixels());
    let stretched = stretch_contrast(&gray, config.low_percentile, config.high_percentile);
    let window = threshold_window(width, height, config.min_window, config.window_divisor);
    let binary = adaptive_threshold(&stretched, window, config.threshold_offset);
    remove_noise(&binary, config.min_neighbors)
}

/// Luminance `0.299R + 0.587G + 0.114B`, composited over white paper
pub fn to_grayscale(img: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let alpha = a as f32 / 255.0;
        let value = luma * alpha + 255.0 * (1.0 - alpha);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Gray values at the `low` and `high` cumulative fractions of the histogram
pub fn percentile_bounds(gray: &GrayImage, low: f32, high: f32) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }

    let total = gray.width() as u64 * gray.height() as u64;
    let low_count = (total as f64 * low as f64).floor() as u64;
    let high_count = (total as f64 * high as f64).floor() as u64;

    let mut low_value = 0u8;
    let mut cumulative = 0u64;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= low_count {
            low_value = value as u8;
            break;
        }
    }

    let mut high_value = 255u8;
    cumulative = 0;
    for (value, count) in histogram.iter().enumerate().rev() {
        cumulative += count;
        if cumulative >= total - high_count {
            high_value = value as u8;
            break;
        }
    }

    (low_value, high_value)
}

/// Map the low percentile to 0 and the high percentile to 255.
/// Coinciding percentiles leave the image unchanged.
pub fn stretch_contrast(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (low_value, high_value) = percentile_bounds(gray, low, high);
    if high_value <= low_value {
        return gray.clone();
    }

    let scale = 255.0 / (high_value - low_value) as f32;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let stretched = ((value as f32 - low_value as f32) * scale).round();
        *slot = stretched.clamp(0.0, 255.0) as u8;
    }

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lut[gray.get_pixel(x, y)[0] as usize]])
    })
}

/// Side of the square averaging window: `max(min_window, min(w, h) / divisor)`
pub fn threshold_window(width: u32, height: u32, min_window: u32, divisor: u32) -> u32 {
    min_window.max(width.min(height) / divisor.max(1))
}

/// Summed-area table with a zero row and column in front
pub struct IntegralImage {
    stride: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self { stride, sums }
    }

    /// Sum over the inclusive rectangle `[x1, x2] x [y1, y2]`
    pub fn sum(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> u64 {
        let s = self.stride;
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize + 1, y2 as usize + 1);
        self.sums[y2 * s + x2] + self.sums[y1 * s + x1]
            - self.sums[y1 * s + x2]
            - self.sums[y2 * s + x1]
    }
}

/// Foreground where a pixel is darker than its local window mean minus `offset`
pub fn adaptive_threshold(gray: &GrayImage, window: u32, offset: i32) -> BinaryMask {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return BinaryMask::empty(w, h);
    }

    let integral = IntegralImage::new(gray);
    let half = window / 2;

    BinaryMask::from_fn(w, h, |x, y| {
        let x1 = x.saturating_sub(half);
        let y1 = y.saturating_sub(half);
        let x2 = (x + half).min(w - 1);
        let y2 = (y + half).min(h - 1);
        let area = ((x2 - x1 + 1) * (y2 - y1 + 1)) as f64;
        let mean = (integral.sum(x1, y1, x2, y2) as f64 / area).round() as i32;
        (gray.get_pixel(x, y)[0] as i32) < mean - offset
    })
}

/// Clear interior foreground pixels with fewer than `min_neighbors` foreground
/// pixels among their eight neighbours. Border pixels are kept as they are.
pub fn remove_noise(mask: &BinaryMask, min_neighbors: u8) -> BinaryMask {
    let (w, h) = mask.dimensions();
    BinaryMask::from_fn(w, h, |x, y| {
        if !mask.is_foreground(x, y) {
            return false;
        }
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return true;
        }

        let mut neighbors = 0u8;
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if (nx, ny) != (x, y) && mask.is_foreground(nx, ny) {
                    neighbors += 1;
                }
            }
        }
        neighbors >= min_neighbors
    })
}
