use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// Gaussian smoothing for an odd kernel size.
///
/// The standard deviation follows the usual kernel-size rule
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8`.
pub fn apply(image: &GrayImage, kernel: u32) -> GrayImage {
    gaussian_blur_f32(image, sigma_for_kernel(kernel))
}

pub fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}
