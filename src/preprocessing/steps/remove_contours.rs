use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Blacken every 8-connected foreground region whose pixel area is at most
/// `area_threshold`. Any non-zero pixel is foreground.
pub fn apply(image: &GrayImage, area_threshold: u32) -> GrayImage {
    let foreground = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y).0[0] == 0 { 0u8 } else { 255u8 }])
    });
    let labels = connected_components(&foreground, Connectivity::Eight, Luma([0u8]));

    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0u32; label_count + 1];
    for label in labels.pixels() {
        areas[label.0[0] as usize] += 1;
    }

    let mut cleaned = image.clone();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label != 0 && areas[label] <= area_threshold {
            cleaned.put_pixel(x, y, Luma([0]));
        }
    }

    tracing::debug!(
        regions = label_count,
        removed = areas.iter().skip(1).filter(|&&a| a <= area_threshold).count(),
        "Small regions removed"
    );

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_specks_keeps_glyphs() {
        let mut img = GrayImage::new(20, 20);
        // 4x4 glyph (area 16)
        for y in 2..6 {
            for x in 2..6 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        // 2-pixel speck
        img.put_pixel(15, 15, Luma([255]));
        img.put_pixel(16, 16, Luma([255]));

        let cleaned = apply(&img, 2);
        assert_eq!(cleaned.get_pixel(15, 15).0[0], 0);
        assert_eq!(cleaned.get_pixel(16, 16).0[0], 0);
        assert_eq!(cleaned.get_pixel(3, 3).0[0], 255);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut img = GrayImage::new(10, 10);
        for x in 1..4 {
            img.put_pixel(x, 1, Luma([255]));
        }
        assert_eq!(apply(&img, 3).get_pixel(2, 1).0[0], 0);
        assert_eq!(apply(&img, 2).get_pixel(2, 1).0[0], 255);
    }

    #[test]
    fn test_mixed_grey_levels_form_one_region() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(1, 1, Luma([90]));
        img.put_pixel(2, 1, Luma([200]));
        img.put_pixel(3, 1, Luma([255]));
        let cleaned = apply(&img, 2);
        assert_eq!(cleaned.get_pixel(1, 1).0[0], 90);
        assert_eq!(cleaned.get_pixel(3, 1).0[0], 255);
    }
}
