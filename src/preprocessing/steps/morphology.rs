//! Greyscale morphology with a square all-ones structuring element.
//!
//! The element is `k×k` with its anchor at `(k/2, k/2)`, so even kernel
//! sizes reach one pixel further up and left than down and right. Pixels
//! outside the image never take part in the min/max.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_dilate, grayscale_erode, grayscale_open, Mask};

/// Largest kernel side a [`Mask`] can hold.
pub const MAX_KERNEL: u32 = 511;

/// `k×k` square anchored at `(k/2, k/2)`. Kernels above [`MAX_KERNEL`] are
/// rejected when a style is parsed and clamped here.
pub fn square_mask(kernel: u32) -> Mask {
    let kernel = kernel.clamp(1, MAX_KERNEL);
    let anchor = (kernel / 2) as u8;
    Mask::from_image(&GrayImage::from_pixel(kernel, kernel, Luma([255])), anchor, anchor)
}

pub fn erode(image: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let mask = square_mask(kernel);
    repeat(image, iterations, |img| grayscale_erode(img, &mask))
}

pub fn dilate(image: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let mask = square_mask(kernel);
    repeat(image, iterations, |img| grayscale_dilate(img, &mask))
}

/// Erosion followed by dilation; removes specks smaller than the kernel.
pub fn opening(image: &GrayImage, kernel: u32) -> GrayImage {
    grayscale_open(image, &square_mask(kernel))
}

/// Dilation followed by erosion; closes gaps smaller than the kernel.
pub fn closing(image: &GrayImage, kernel: u32) -> GrayImage {
    grayscale_close(image, &square_mask(kernel))
}

/// Per-pixel difference between dilation and erosion (outline of shapes).
pub fn gradient(image: &GrayImage, kernel: u32) -> GrayImage {
    let mask = square_mask(kernel);
    let dilated = grayscale_dilate(image, &mask);
    let eroded = grayscale_erode(image, &mask);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hi = dilated.get_pixel(x, y).0[0];
        let lo = eroded.get_pixel(x, y).0[0];
        Luma([hi.saturating_sub(lo)])
    })
}

fn repeat<F>(image: &GrayImage, iterations: u32, step: F) -> GrayImage
where
    F: Fn(&GrayImage) -> GrayImage,
{
    let mut current = image.clone();
    for _ in 0..iterations {
        current = step(&current);
    }
    current
}
