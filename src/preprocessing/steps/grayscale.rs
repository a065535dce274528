use image::DynamicImage;

/// Convert a colour image to single-channel luminance.
/// Images that are already single channel pass through untouched.
pub fn apply(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) => image,
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}
