//! Preprocessing and Data Augmentation
//!
//! Images are normalized to `[-0.5, 0.5]` and then, for training, perturbed
//! in this order:
//!
//! 1. random brightness shift
//! 2. random per-channel contrast around the channel mean
//! 3. bilinear resize to the network input size
//! 4. random left-right flip
//! 5. clip back to `[-0.5, 0.5]`
//!
//! Evaluation images are only normalized and resized.
//!
//! All pixel work happens on `Rgb32FImage` so intermediate values may leave
//! the normalized range until the final clip.

use burn::config::Config;
use image::{imageops, Rgb, Rgb32FImage, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Lower bound of a normalized pixel
pub const NORMALIZED_MIN: f32 = -0.5;
/// Upper bound of a normalized pixel
pub const NORMALIZED_MAX: f32 = 0.5;

/// Configuration for the training augmentations
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Output side length (square)
    #[config(default = "224")]
    pub image_size: u32,

    /// Brightness offset is drawn from `[-delta, delta]`
    #[config(default = "0.1")]
    pub max_brightness_delta: f32,

    #[config(default = "0.9")]
    pub contrast_lower: f32,

    #[config(default = "1.1")]
    pub contrast_upper: f32,

    /// Probability of a left-right flip
    #[config(default = "0.5")]
    pub flip_prob: f64,
}

/// `p / 255 - 0.5` for every subpixel
pub fn normalize(img: &RgbImage) -> Rgb32FImage {
    let (w, h) = img.dimensions();
    let data = img
        .as_raw()
        .iter()
        .map(|&p| p as f32 / 255.0 + NORMALIZED_MIN)
        .collect();
    // Same dimensions and subpixel count as the source buffer
    Rgb32FImage::from_raw(w, h, data).unwrap_or_else(|| Rgb32FImage::new(w, h))
}

/// Inverse of [`normalize`] for a single value
pub fn denormalize(x: f32) -> f32 {
    (x - NORMALIZED_MIN) * 255.0
}

/// Back to displayable 8-bit pixels
pub fn denormalize_image(img: &Rgb32FImage) -> RgbImage {
    let (w, h) = img.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y);
        Rgb([0, 1, 2].map(|c| denormalize(p[c]).round().clamp(0.0, 255.0) as u8))
    })
}

/// Add `delta` to every value
pub fn adjust_brightness(img: &mut Rgb32FImage, delta: f32) {
    for v in img.iter_mut() {
        *v += delta;
    }
}

/// Scale each channel's distance from its mean by `factor`
pub fn adjust_contrast(img: &mut Rgb32FImage, factor: f32) {
    let n = (img.width() * img.height()) as f32;
    if n == 0.0 {
        return;
    }

    let mut sums = [0.0f32; 3];
    for p in img.pixels() {
        for c in 0..3 {
            sums[c] += p[c];
        }
    }
    let means = sums.map(|s| s / n);

    for p in img.pixels_mut() {
        for c in 0..3 {
            p[c] = (p[c] - means[c]) * factor + means[c];
        }
    }
}

/// Bilinear resize with half-pixel centers and edge clamping.
///
/// Unlike `imageops::resize` this does not clamp float subpixels to `[0, 1]`.
pub fn resize_bilinear(img: &Rgb32FImage, width: u32, height: u32) -> Rgb32FImage {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Rgb32FImage::new(width, height);
    }
    if (src_w, src_h) == (width, height) {
        return img.clone();
    }

    let scale_x = src_w as f32 / width as f32;
    let scale_y = src_h as f32 / height as f32;
    let max_x = (src_w - 1) as f32;
    let max_y = (src_h - 1) as f32;

    Rgb32FImage::from_fn(width, height, |x, y| {
        let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(src_w - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let p00 = img.get_pixel(x0, y0);
        let p10 = img.get_pixel(x1, y0);
        let p01 = img.get_pixel(x0, y1);
        let p11 = img.get_pixel(x1, y1);

        Rgb([0, 1, 2].map(|c| {
            p00[c] * (1.0 - fx) * (1.0 - fy)
                + p10[c] * fx * (1.0 - fy)
                + p01[c] * (1.0 - fx) * fy
                + p11[c] * fx * fy
        }))
    })
}

pub fn flip_left_right(img: &Rgb32FImage) -> Rgb32FImage {
    imageops::flip_horizontal(img)
}

/// Clamp every value to `[lo, hi]`
pub fn clip(img: &mut Rgb32FImage, lo: f32, hi: f32) {
    for v in img.iter_mut() {
        *v = v.clamp(lo, hi);
    }
}

/// HWC image to a flat CHW buffer
pub fn to_chw(img: &Rgb32FImage) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let plane = w * h;
    let mut out = vec![0.0f32; 3 * plane];

    for (i, p) in img.pixels().enumerate() {
        out[i] = p[0];
        out[plane + i] = p[1];
        out[2 * plane + i] = p[2];
    }

    out
}

/// Turns decoded images into model input
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: AugmentationConfig,
    training: bool,
}

impl Preprocessor {
    pub fn new(config: AugmentationConfig, training: bool) -> Self {
        Self { config, training }
    }

    /// Default augmentations for the training split
    pub fn training() -> Self {
        Self::new(AugmentationConfig::new(), true)
    }

    /// Deterministic path for validation and prediction
    pub fn evaluation() -> Self {
        Self::new(AugmentationConfig::new(), false)
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn image_size(&self) -> u32 {
        self.config.image_size
    }

    /// Randomly perturb a normalized image and resize it
    pub fn augment(&self, img: Rgb32FImage, rng: &mut ChaCha8Rng) -> Rgb32FImage {
        let cfg = &self.config;
        let mut img = img;

        let delta = rng.gen_range(-cfg.max_brightness_delta..=cfg.max_brightness_delta);
        adjust_brightness(&mut img, delta);

        let factor = rng.gen_range(cfg.contrast_lower..=cfg.contrast_upper);
        adjust_contrast(&mut img, factor);

        let mut img = resize_bilinear(&img, cfg.image_size, cfg.image_size);

        if rng.gen_bool(cfg.flip_prob) {
            img = flip_left_right(&img);
        }

        clip(&mut img, NORMALIZED_MIN, NORMALIZED_MAX);
        img
    }

    /// Normalized, resized image without any randomness
    pub fn evaluate(&self, img: &RgbImage) -> Rgb32FImage {
        resize_bilinear(&normalize(img), self.config.image_size, self.config.image_size)
    }

    /// Full pipeline to a CHW buffer of `3 * size * size` values
    pub fn process(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let out = if self.training {
            self.augment(normalize(img), rng)
        } else {
            self.evaluate(img)
        };
        to_chw(&out)
    }
}
