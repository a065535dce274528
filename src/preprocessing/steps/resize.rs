use super::border::{self, BorderMode};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Resize to exactly `target_width × target_height` without distorting the glyph.
///
/// Wider-than-tall images are scaled to the target width and taller ones to
/// the target height, aspect ratio preserved. The short side is then padded
/// with a centred black border and the result stretched to the exact size,
/// which only corrects rounding by then.
pub fn apply(image: DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();

    if (width, height) == (target_width, target_height) {
        return image;
    }

    if width == 0 || height == 0 {
        return DynamicImage::new(target_width, target_height, image.color());
    }

    // Step 1: scale along the dominant dimension
    let scaled = if width > height {
        let new_height = (height as f64 * target_width as f64 / width as f64) as u32;
        resize_exact(image, target_width, new_height.max(1))
    } else {
        let new_width = (width as f64 * target_height as f64 / height as f64) as u32;
        resize_exact(image, new_width.max(1), target_height)
    };

    // Step 2: pad the short side
    let (scaled_width, scaled_height) = scaled.dimensions();
    let vertical = target_height.saturating_sub(scaled_height) / 2;
    let horizontal = target_width.saturating_sub(scaled_width) / 2;
    let padded = border::apply(scaled, vertical, horizontal, BorderMode::Constant([0, 0, 0]));

    // Step 3: force the exact size
    resize_exact(padded, target_width, target_height)
}

fn resize_exact(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    image.resize_exact(width, height, FilterType::Triangle)
}
