//! Owned raster buffer passed by value through the cleaning pipeline.

use crate::error::CaptchaError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An 8-bit image holding either one channel (processed) or three channels
/// (freshly imported), plus a read-only snapshot of the image as imported.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    image: DynamicImage,
    before: Arc<DynamicImage>,
    filename: Option<String>,
}

impl RasterBuffer {
    /// Wrap an in-memory image. Greyscale input stays single channel,
    /// everything else is normalised to 8-bit RGB.
    pub fn from_image(image: DynamicImage) -> Self {
        let image = normalise(image);
        Self {
            before: Arc::new(image.clone()),
            image,
            filename: None,
        }
    }

    pub fn from_gray(image: GrayImage) -> Self {
        Self::from_image(DynamicImage::ImageLuma8(image))
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self::from_image(DynamicImage::ImageRgb8(image))
    }

    /// Load an image file as a 3-channel buffer, remembering its file name.
    pub fn open(path: &Path) -> Result<Self, CaptchaError> {
        if !path.exists() {
            return Err(CaptchaError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "path doesn't exist"),
            ));
        }

        let image = image::open(path).map_err(|e| {
            CaptchaError::Image(format!("Failed to load {}: {}", path.display(), e))
        })?;

        let mut buffer = Self::from_image(DynamicImage::ImageRgb8(image.into_rgb8()));
        buffer.filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(buffer)
    }

    /// Decode an encoded image (PNG, JPEG, ...) as a 3-channel buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CaptchaError> {
        let image = image::load_from_memory(data)
            .map_err(|e| CaptchaError::Image(format!("Failed to decode image: {}", e)))?;
        Ok(Self::from_image(DynamicImage::ImageRgb8(image.into_rgb8())))
    }

    /// Decode a base64 image, optionally wrapped in a `data:` URL.
    pub fn from_base64(encoded: &str) -> Result<Self, CaptchaError> {
        let encoded = encoded.trim();
        let payload = encoded
            .split_once("base64,")
            .map_or(encoded, |(_, data)| data);
        let data = STANDARD
            .decode(payload)
            .map_err(|e| CaptchaError::Image(format!("Invalid base64 image: {}", e)))?;
        Self::from_bytes(&data)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// The image as it was before any pipeline operation ran.
    pub fn before(&self) -> &DynamicImage {
        &self.before
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// File name without its extension.
    pub fn stem(&self) -> Option<&str> {
        let filename = self.filename.as_deref()?;
        Some(match filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => filename,
        })
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Borrow the pixels of a single-channel buffer.
    pub fn as_gray(&self) -> Option<&GrayImage> {
        self.image.as_luma8()
    }

    /// Replace the current pixels, keeping the snapshot and file name.
    pub fn with_image(self, image: DynamicImage) -> Self {
        Self {
            image: normalise(image),
            ..self
        }
    }

    /// Transform the current pixels in place of the buffer.
    pub fn map_image<F, E>(self, f: F) -> Result<Self, E>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, E>,
    {
        let Self {
            image,
            before,
            filename,
        } = self;
        Ok(Self {
            image: normalise(f(image)?),
            before,
            filename,
        })
    }

    /// Write the current pixels to `folder/<filename>`, creating the folder.
    pub fn save(&self, folder: &Path) -> Result<PathBuf, CaptchaError> {
        let filename = self
            .filename
            .as_deref()
            .ok_or_else(|| CaptchaError::Image("No filename has been provided".to_string()))?;

        std::fs::create_dir_all(folder).map_err(|e| CaptchaError::io(folder, e))?;
        let path = folder.join(filename);
        self.save_as(&path)?;
        Ok(path)
    }

    pub fn save_as(&self, path: &Path) -> Result<(), CaptchaError> {
        self.image
            .save(path)
            .map_err(|e| CaptchaError::Image(format!("Failed to save {}: {}", path.display(), e)))
    }
}

fn normalise(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        other if other.color().has_color() => DynamicImage::ImageRgb8(other.into_rgb8()),
        other => DynamicImage::ImageLuma8(other.into_luma8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, LumaA, Rgba, RgbaImage};

    #[test]
    fn test_rgba_is_normalised_to_three_channels() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let buffer = RasterBuffer::from_image(DynamicImage::ImageRgba8(img));
        assert_eq!(buffer.channels(), 3);
    }

    #[test]
    fn test_gray_alpha_is_normalised_to_one_channel() {
        let img = image::ImageBuffer::from_pixel(4, 4, LumaA([10u8, 255]));
        let buffer = RasterBuffer::from_image(DynamicImage::ImageLumaA8(img));
        assert_eq!(buffer.channels(), 1);
    }

    #[test]
    fn test_before_image_survives_replacement() {
        let buffer = RasterBuffer::from_gray(GrayImage::from_pixel(3, 3, Luma([7])));
        let replaced = buffer.with_image(DynamicImage::ImageLuma8(GrayImage::new(5, 5)));
        assert_eq!(replaced.dimensions(), (5, 5));
        assert_eq!(replaced.before().width(), 3);
        assert_eq!(replaced.before().to_luma8().get_pixel(0, 0).0[0], 7);
    }

    #[test]
    fn test_from_base64_accepts_plain_and_data_url() {
        let mut png = Vec::new();
        GrayImage::from_pixel(5, 3, Luma([90]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let encoded = STANDARD.encode(&png);

        let plain = RasterBuffer::from_base64(&encoded).unwrap();
        assert_eq!(plain.dimensions(), (5, 3));
        assert_eq!(plain.channels(), 3);

        let url = RasterBuffer::from_base64(&format!("data:image/png;base64,{}\n", encoded)).unwrap();
        assert_eq!(url.dimensions(), (5, 3));
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        let err = RasterBuffer::from_base64("not*base64").unwrap_err();
        assert!(matches!(err, CaptchaError::Image(_)));
    }

    #[test]
    fn test_open_missing_path_is_io_error() {
        let err = RasterBuffer::open(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, CaptchaError::Io { .. }));
    }

    #[test]
    fn test_open_remembers_filename_and_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R4ZD.png");
        GrayImage::from_pixel(6, 4, Luma([200])).save(&path).unwrap();

        let buffer = RasterBuffer::open(&path).unwrap();
        assert_eq!(buffer.filename(), Some("R4ZD.png"));
        assert_eq!(buffer.stem(), Some("R4ZD"));
        assert_eq!(buffer.channels(), 3);
    }

    #[test]
    fn test_save_without_filename_fails() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = RasterBuffer::from_gray(GrayImage::new(2, 2));
        assert!(buffer.save(dir.path()).is_err());
    }
}
