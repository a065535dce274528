use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Fixed-level binarisation: pixels brighter than `level` become white
/// (black when `inverted`), everything else the opposite.
pub fn fixed(image: &GrayImage, level: u8, inverted: bool) -> GrayImage {
    let (on, off) = if inverted { (0u8, 255u8) } else { (255u8, 0u8) };
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > level {
            Luma([on])
        } else {
            Luma([off])
        }
    })
}

/// Otsu binarisation: the level maximising inter-class variance of the
/// two-class histogram split.
pub fn otsu(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    tracing::debug!(level, "Otsu threshold level");
    fixed(image, level, false)
}

/// Mean adaptive thresholding
///
/// For each pixel, threshold = mean(block_size × block_size window) - c.
/// Windows are clipped at the image border.
pub fn adaptive(image: &GrayImage, block_size: u32, c: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let half_window = block_size as i32 / 2;

    // Precompute the integral image for constant-time window sums
    let integral = compute_integral_image(image);

    GrayImage::from_fn(width, height, |x, y| {
        let x1 = (x as i32 - half_window).max(0) as u32;
        let y1 = (y as i32 - half_window).max(0) as u32;
        let x2 = (x as i32 + half_window).min(width as i32 - 1) as u32;
        let y2 = (y as i32 + half_window).min(height as i32 - 1) as u32;

        let threshold = window_mean(&integral, x1, y1, x2, y2) - c;

        let pixel = image.get_pixel(x, y).0[0] as f64;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn compute_integral_image(img: &GrayImage) -> Vec<Vec<f64>> {
    let (width, height) = img.dimensions();
    let mut integral = vec![vec![0.0f64; width as usize + 1]; height as usize + 1];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
            integral[y + 1][x + 1] =
                val + integral[y][x + 1] + integral[y + 1][x] - integral[y][x];
        }
    }

    integral
}

fn window_mean(integral: &[Vec<f64>], x1: u32, y1: u32, x2: u32, y2: u32) -> f64 {
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize + 1, y2 as usize + 1);
    let area = ((x2 - x1) * (y2 - y1)) as f64;
    let sum = integral[y2][x2] - integral[y1][x2] - integral[y2][x1] + integral[y1][x1];
    sum / area
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }

    #[test]
    fn test_fixed_threshold_is_strictly_greater() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[99u8, 100, 101][x as usize]]));
        let result = fixed(&img, 100, false);
        assert_eq!(result.get_pixel(0, 0).0[0], 0);
        assert_eq!(result.get_pixel(1, 0).0[0], 0);
        assert_eq!(result.get_pixel(2, 0).0[0], 255);

        let inverted = fixed(&img, 100, true);
        assert_eq!(inverted.get_pixel(0, 0).0[0], 255);
        assert_eq!(inverted.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn test_threshold_zero_keeps_every_nonzero_pixel() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([x as u8]));
        let result = fixed(&img, 0, false);
        assert_eq!(result.get_pixel(0, 0).0[0], 0);
        assert_eq!(result.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_otsu_separates_two_populations() {
        let img = GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([40]) } else { Luma([210]) });
        let result = otsu(&img);
        assert!(is_binary(&result));
        assert_eq!(result.get_pixel(2, 2).0[0], 0);
        assert_eq!(result.get_pixel(15, 2).0[0], 255);
    }

    #[test]
    fn test_adaptive_binarizes_gradient() {
        let img = GrayImage::from_fn(50, 50, |x, _| Luma([(x as u8 * 5).min(255)]));
        let result = adaptive(&img, 11, 2.0);
        assert!(is_binary(&result));
    }

    #[test]
    fn test_adaptive_handles_text_pattern() {
        // Dark stroke on light background
        let mut img = GrayImage::from_pixel(50, 20, Luma([240]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([20]));
        }

        let result = adaptive(&img, 15, 5.0);

        assert_eq!(result.get_pixel(25, 10).0[0], 0);
        assert_eq!(result.get_pixel(25, 5).0[0], 255);
    }
}
