//! Merge-threshold calibration for one CAPTCHA style.
//!
//! Two touching characters form one box that is noticeably wider than any
//! single glyph of the style's font. Pooling the aspect ratios of the
//! heaviest boxes of many samples and taking the smallest Z-score outlier
//! gives the ratio above which a box is treated as a merged pair.

use super::contours;
use crate::error::CaptchaError;
use crate::raster::RasterBuffer;

/// Standard deviations from the mean beyond which a ratio is an outlier.
pub const OUTLIER_Z_SCORE: f64 = 3.0;

/// Merge threshold used when the sample holds no outlier.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 1.5;

/// Accumulates aspect ratios over a calibration batch.
#[derive(Debug, Clone)]
pub struct OutlierCalibrator {
    max_char_count: usize,
    aspect_ratios: Vec<f64>,
    images: usize,
}

impl OutlierCalibrator {
    pub fn new(max_char_count: usize) -> Self {
        Self {
            max_char_count,
            aspect_ratios: Vec::new(),
            images: 0,
        }
    }

    /// Pool the aspect ratios of the image's `max_char_count` heaviest regions.
    pub fn add_image(&mut self, buffer: &RasterBuffer) -> Result<(), CaptchaError> {
        let boxes = contours::rank(buffer, self.max_char_count)?;
        self.aspect_ratios
            .extend(boxes.iter().map(|b| b.aspect_ratio()));
        self.images += 1;
        Ok(())
    }

    pub fn add_ratios(&mut self, ratios: impl IntoIterator<Item = f64>) {
        self.aspect_ratios.extend(ratios);
    }

    pub fn sample(&self) -> &[f64] {
        &self.aspect_ratios
    }

    pub fn image_count(&self) -> usize {
        self.images
    }

    pub fn outliers(&self) -> Result<Vec<f64>, CaptchaError> {
        z_score_outliers(&self.aspect_ratios, OUTLIER_Z_SCORE)
    }

    /// Smallest outlier rounded to two decimals, or
    /// [`DEFAULT_MERGE_THRESHOLD`] when there is none.
    pub fn merge_threshold(&self) -> Result<f64, CaptchaError> {
        let outliers = self.outliers()?;
        let threshold = outliers
            .into_iter()
            .min_by(|a, b| a.total_cmp(b))
            .map(round2)
            .unwrap_or(DEFAULT_MERGE_THRESHOLD);

        tracing::info!(
            images = self.images,
            samples = self.aspect_ratios.len(),
            threshold,
            "Merge threshold calibrated"
        );

        Ok(threshold)
    }
}

/// Calibrate a merge threshold from pre-segmented images.
pub fn calibrate(images: &[RasterBuffer], max_char_count: usize) -> Result<f64, CaptchaError> {
    let mut calibrator = OutlierCalibrator::new(max_char_count);
    for image in images {
        calibrator.add_image(image)?;
    }
    calibrator.merge_threshold()
}

/// Values whose distance from the population mean exceeds `threshold`
/// population standard deviations.
pub fn z_score_outliers(data: &[f64], threshold: f64) -> Result<Vec<f64>, CaptchaError> {
    if data.is_empty() {
        return Err(CaptchaError::Calibration(
            "no aspect ratios were collected".to_string(),
        ));
    }

    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev <= 1e-12 * mean.abs().max(1.0) {
        return Err(CaptchaError::Calibration(format!(
            "aspect ratios have zero variance (all {:.4}) across {} samples",
            mean,
            data.len()
        )));
    }

    Ok(data
        .iter()
        .copied()
        .filter(|v| ((v - mean) / std_dev).abs() > threshold)
        .collect())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_empty_sample_fails() {
        let calibrator = OutlierCalibrator::new(4);
        assert!(matches!(
            calibrator.merge_threshold(),
            Err(CaptchaError::Calibration(_))
        ));
    }

    #[test]
    fn test_zero_variance_fails() {
        let mut calibrator = OutlierCalibrator::new(4);
        calibrator.add_ratios(vec![0.7; 12]);
        assert!(matches!(
            calibrator.merge_threshold(),
            Err(CaptchaError::Calibration(_))
        ));
    }

    #[test]
    fn test_no_outlier_defaults() {
        let mut calibrator = OutlierCalibrator::new(4);
        calibrator.add_ratios([0.6, 0.7, 0.8, 0.7, 0.65, 0.75]);
        assert_eq!(calibrator.merge_threshold().unwrap(), DEFAULT_MERGE_THRESHOLD);
    }

    #[test]
    fn test_smallest_outlier_rounded() {
        let mut ratios = vec![0.7; 30];
        ratios.extend([0.6, 0.8, 0.65, 0.75]);
        ratios.push(1.8312);
        ratios.push(2.4);

        let outliers = z_score_outliers(&ratios, OUTLIER_Z_SCORE).unwrap();
        assert_eq!(outliers, vec![1.8312, 2.4]);

        let mut calibrator = OutlierCalibrator::new(4);
        calibrator.add_ratios(ratios);
        assert_eq!(calibrator.merge_threshold().unwrap(), 1.83);
    }

    #[test]
    fn test_calibrate_from_images() {
        // Twenty images with four 6x10 glyphs, one with a merged 18x10 pair
        let glyphs = |wide: bool| {
            let mut img = GrayImage::new(80, 20);
            let specs: Vec<(u32, u32)> = if wide {
                vec![(2, 18), (26, 6), (40, 6)]
            } else {
                vec![(2, 6), (14, 6), (26, 6), (40, 6)]
            };
            for (x0, w) in specs {
                for y in 5..15 {
                    for x in x0..x0 + w {
                        img.put_pixel(x, y, Luma([255]));
                    }
                }
            }
            RasterBuffer::from_gray(img)
        };

        let mut images: Vec<RasterBuffer> = (0..20).map(|_| glyphs(false)).collect();
        // vary one glyph so the sample is not constant
        let mut varied = GrayImage::new(80, 20);
        for (x0, w) in [(2u32, 5u32), (14, 7), (26, 6), (40, 6)] {
            for y in 5..15 {
                for x in x0..x0 + w {
                    varied.put_pixel(x, y, Luma([255]));
                }
            }
        }
        images.push(RasterBuffer::from_gray(varied));
        images.push(glyphs(true));

        let threshold = calibrate(&images, 4).unwrap();
        assert_eq!(threshold, 1.8);
    }
}
