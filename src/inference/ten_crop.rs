//! Ten-crop test-time augmentation
//!
//! The image is resized so its shorter side is 256, then the four corner
//! patches, the centre patch and the mirror image of each are cut out.

use image::{imageops, imageops::FilterType, Rgb32FImage, RgbImage};

use crate::dataset::augmentation::{flip_left_right, normalize, resize_bilinear, to_chw};

/// Shorter side of the image before cropping
pub const TEN_CROP_RESIZE: u32 = 256;

/// Resize keeping the aspect ratio so that `min(width, height) == target`
pub fn resize_shorter_side(img: &RgbImage, target: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let (new_w, new_h) = if w <= h {
        (target, ((h as u64 * target as u64) / w as u64).max(1) as u32)
    } else {
        (((w as u64 * target as u64) / h as u64).max(1) as u32, target)
    };

    imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Top-left corners of the top-left, top-right, bottom-left, bottom-right
/// and centre patches
pub fn crop_origins(width: u32, height: u32, crop: u32) -> [(u32, u32); 5] {
    let right = width.saturating_sub(crop);
    let bottom = height.saturating_sub(crop);
    [
        (0, 0),
        (right, 0),
        (0, bottom),
        (right, bottom),
        (right / 2, bottom / 2),
    ]
}

/// Five patches of a normalized image plus their mirrors, each `crop x crop`
pub fn ten_crops(img: &Rgb32FImage, crop: u32) -> Vec<Rgb32FImage> {
    let (w, h) = img.dimensions();

    let patches: Vec<Rgb32FImage> = crop_origins(w, h, crop)
        .iter()
        .map(|&(x, y)| {
            let patch = imageops::crop_imm(img, x, y, crop, crop).to_image();
            if patch.dimensions() == (crop, crop) {
                patch
            } else {
                resize_bilinear(&patch, crop, crop)
            }
        })
        .collect();

    let mirrored: Vec<Rgb32FImage> = patches.iter().map(flip_left_right).collect();
    patches.into_iter().chain(mirrored).collect()
}

/// Ten CHW buffers ready for stacking into a `[10, 3, crop, crop]` tensor
pub fn ten_crop_inputs(img: &RgbImage, crop: u32) -> Vec<Vec<f32>> {
    let resized = resize_shorter_side(img, TEN_CROP_RESIZE.max(crop));
    ten_crops(&normalize(&resized), crop)
        .iter()
        .map(to_chw)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resize_shorter_side() {
        let img = RgbImage::new(400, 300);
        assert_eq!(resize_shorter_side(&img, 256).dimensions(), (341, 256));

        let img = RgbImage::new(100, 200);
        assert_eq!(resize_shorter_side(&img, 256).dimensions(), (256, 512));
    }

    #[test]
    fn test_crop_origins() {
        let origins = crop_origins(300, 256, 224);
        assert_eq!(origins[0], (0, 0));
        assert_eq!(origins[1], (76, 0));
        assert_eq!(origins[2], (0, 32));
        assert_eq!(origins[3], (76, 32));
        assert_eq!(origins[4], (38, 16));
    }

    #[test]
    fn test_ten_crops_are_mirrored_pairs() {
        let img = Rgb32FImage::from_fn(12, 10, |x, y| Rgb([x as f32, y as f32, 0.0]));
        let crops = ten_crops(&img, 8);

        assert_eq!(crops.len(), 10);
        assert!(crops.iter().all(|c| c.dimensions() == (8, 8)));

        // top-left patch starts at the origin, its mirror ends there
        assert_eq!(crops[0].get_pixel(0, 0)[0], 0.0);
        assert_eq!(crops[5].get_pixel(7, 0)[0], 0.0);
        // bottom-right patch
        assert_eq!(crops[3].get_pixel(7, 7)[0], 11.0);
        assert_eq!(crops[3].get_pixel(7, 7)[1], 9.0);
    }

    #[test]
    fn test_ten_crop_inputs_shape() {
        let img = RgbImage::from_pixel(300, 260, Rgb([10, 20, 30]));
        let inputs = ten_crop_inputs(&img, 224);

        assert_eq!(inputs.len(), 10);
        assert!(inputs.iter().all(|v| v.len() == 3 * 224 * 224));
    }
}
