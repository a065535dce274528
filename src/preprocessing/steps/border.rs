use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb};

/// How the added border pixels are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    /// Repeat the nearest edge pixel.
    Replicate,
    /// Fill with a constant colour (single-channel images use the first component).
    Constant([u8; 3]),
}

/// Largest padding a style may request on one side.
pub const MAX_BORDER: u32 = 4096;

/// Size after padding, or `None` if it does not fit in `u32`.
pub fn padded_size(width: u32, height: u32, vertical: u32, horizontal: u32) -> Option<(u32, u32)> {
    let new_width = horizontal.checked_mul(2)?.checked_add(width)?;
    let new_height = vertical.checked_mul(2)?.checked_add(height)?;
    Some((new_width, new_height))
}

/// Pad `vertical` rows above and below and `horizontal` columns left and right.
pub fn apply(image: DynamicImage, vertical: u32, horizontal: u32, mode: BorderMode) -> DynamicImage {
    if vertical == 0 && horizontal == 0 {
        return image;
    }

    match image {
        DynamicImage::ImageLuma8(img) => {
            let fill = match mode {
                BorderMode::Constant(colour) => Some(Luma([colour[0]])),
                BorderMode::Replicate => None,
            };
            DynamicImage::ImageLuma8(pad(&img, vertical, horizontal, fill))
        }
        other => {
            let fill = match mode {
                BorderMode::Constant(colour) => Some(Rgb(colour)),
                BorderMode::Replicate => None,
            };
            DynamicImage::ImageRgb8(pad(&other.into_rgb8(), vertical, horizontal, fill))
        }
    }
}

/// `fill == None` replicates edge pixels. The padded size must fit in `u32`
/// (see [`padded_size`]).
fn pad<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    vertical: u32,
    horizontal: u32,
    fill: Option<P>,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    let new_width = width + 2 * horizontal;
    let new_height = height + 2 * vertical;

    ImageBuffer::from_fn(new_width, new_height, |x, y| {
        let inside = x >= horizontal
            && x < horizontal + width
            && y >= vertical
            && y < vertical + height;

        match fill {
            Some(colour) if !inside => colour,
            _ if width == 0 || height == 0 => fill.unwrap_or_else(|| {
                *P::from_slice(&[0u8; 4][..P::CHANNEL_COUNT as usize])
            }),
            _ => {
                let sx = (x as i64 - horizontal as i64).clamp(0, width as i64 - 1) as u32;
                let sy = (y as i64 - vertical as i64).clamp(0, height as i64 - 1) as u32;
                *img.get_pixel(sx, sy)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_constant_border_dimensions_and_fill() {
        let img = GrayImage::from_pixel(10, 6, Luma([200]));
        let result = apply(DynamicImage::ImageLuma8(img), 4, 3, BorderMode::Constant([0, 0, 0]));
        assert_eq!((result.width(), result.height()), (16, 14));

        let gray = result.as_luma8().unwrap();
        assert_eq!(gray.get_pixel(0, 0).0[0], 0);
        assert_eq!(gray.get_pixel(3, 4).0[0], 200);
        assert_eq!(gray.get_pixel(2, 4).0[0], 0);
    }

    #[test]
    fn test_replicate_border_copies_edges() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[10u8, 20, 30][x as usize]]));
        let result = apply(DynamicImage::ImageLuma8(img), 1, 2, BorderMode::Replicate);
        let gray = result.as_luma8().unwrap();

        assert_eq!(gray.dimensions(), (7, 3));
        assert_eq!(gray.get_pixel(0, 0).0[0], 10);
        assert_eq!(gray.get_pixel(6, 2).0[0], 30);
        assert_eq!(gray.get_pixel(3, 1).0[0], 20);
    }

    #[test]
    fn test_padded_size_detects_overflow() {
        assert_eq!(padded_size(10, 6, 4, 3), Some((16, 14)));
        assert_eq!(padded_size(10, 6, 0, u32::MAX / 2), None);
        assert_eq!(padded_size(1, u32::MAX, 1, 0), None);
    }

    #[test]
    fn test_colour_border_keeps_three_channels() {
        let img = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let result = apply(DynamicImage::ImageRgb8(img), 1, 1, BorderMode::Constant([9, 8, 7]));
        let rgb = result.as_rgb8().unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([9, 8, 7]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([1, 2, 3]));
    }
}
