use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Fill background pockets fully enclosed by foreground.
///
/// Any non-zero pixel counts as foreground. The result is binary: every
/// foreground pixel and every enclosed background pixel becomes 255.
pub fn apply(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();

    // Label background regions; foreground acts as the "background" value
    let inverted = GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y).0[0] == 0 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));

    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut touches_border = vec![false; label_count + 1];
    for (x, y, label) in labels.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            touches_border[label.0[0] as usize] = true;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        if label == 0 || !touches_border[label] {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_ring_interior() {
        // 7x7 ring with a 3x3 hole at the center of a 11x11 canvas
        let img = GrayImage::from_fn(11, 11, |x, y| {
            let ring = (2..9).contains(&x) && (2..9).contains(&y);
            let hole = (4..7).contains(&x) && (4..7).contains(&y);
            if ring && !hole {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let filled = apply(&img);
        assert_eq!(filled.get_pixel(5, 5).0[0], 255);
        assert_eq!(filled.get_pixel(0, 0).0[0], 0);
        assert_eq!(filled.get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn test_open_shapes_are_not_filled() {
        // U shape open at the top border
        let img = GrayImage::from_fn(9, 9, |x, y| {
            if (x == 2 || x == 6) && y < 7 || (2..=6).contains(&x) && y == 6 {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let filled = apply(&img);
        assert_eq!(filled.get_pixel(4, 3).0[0], 0);
        assert_eq!(filled.get_pixel(2, 3).0[0], 255);
    }

    #[test]
    fn test_grey_foreground_becomes_white() {
        let img = GrayImage::from_fn(5, 5, |x, y| if x == 2 && y == 2 { Luma([90]) } else { Luma([0]) });
        let filled = apply(&img);
        assert_eq!(filled.get_pixel(2, 2).0[0], 255);
    }
}
