//! Batch processing of one style's sample folder: clean, calibrate,
//! segment and extract training characters.

use crate::error::CaptchaError;
use crate::preprocessing::Pipeline;
use crate::raster::RasterBuffer;
use crate::segmentation::extractor::ground_truth_label;
use crate::segmentation::{CharacterExtractor, OutlierCalibrator, SegmentationResult, Segmenter};
use crate::style::StyleConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const CLEANED_DIR: &str = "cleaned";
pub const CHARACTERS_DIR: &str = "characters";
pub const PREVIEW_DIR: &str = "preview";

/// Summary of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub style: String,
    /// Images cleaned and fed to calibration
    pub processed: usize,
    /// Images dropped before calibration because a stage failed
    pub skipped: usize,
    pub segmented: usize,
    pub failed_segmentations: usize,
    pub characters_written: usize,
    pub threshold: f64,
    pub total_time_ms: u64,
}

/// Sorted `*.png` files directly inside `folder`.
pub fn list_samples(folder: &Path) -> Result<Vec<PathBuf>, CaptchaError> {
    let entries = std::fs::read_dir(folder).map_err(|e| CaptchaError::io(folder, e))?;
    let mut samples: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    samples.sort();
    Ok(samples)
}

/// Run the whole training-data preparation for `style` over
/// `<data_dir>/<folder>`, storing the calibrated threshold in the style file.
///
/// A sample that fails to load or clean is logged and skipped. An empty
/// folder, a calibration failure or a write-back failure aborts the run.
pub fn process_style(data_dir: &Path, style: &mut StyleConfig) -> Result<BatchReport, CaptchaError> {
    let start = Instant::now();
    let folder = data_dir.join(style.folder());
    let samples = list_samples(&folder)?;
    if samples.is_empty() {
        return Err(CaptchaError::Config(format!(
            "no .png samples found in {}",
            folder.display()
        )));
    }

    tracing::info!(style = style.name(), samples = samples.len(), "Processing style");

    let mut report = BatchReport {
        style: style.name().to_string(),
        ..BatchReport::default()
    };

    let pre_segmentation = Pipeline::pre_segmentation();
    let range = style.captcha_length();
    let mut calibrator = OutlierCalibrator::new(range.max());
    let mut prepared = Vec::with_capacity(samples.len());

    for path in &samples {
        match prepare(style, &pre_segmentation, &folder, path) {
            Ok(buffer) => {
                if let Err(err) = calibrator.add_image(&buffer) {
                    skip(path, "calibration", &err);
                    report.skipped += 1;
                    continue;
                }
                prepared.push(buffer);
                report.processed += 1;
            }
            Err((stage, err)) => {
                skip(path, stage, &err);
                report.skipped += 1;
            }
        }
    }

    let threshold = calibrator.merge_threshold()?;
    style.store_threshold(threshold)?;
    report.threshold = threshold;

    let segmenter = Segmenter::new(range, threshold);
    let extractor = CharacterExtractor::new(folder.join(CHARACTERS_DIR));

    for buffer in &prepared {
        let boxes = match segmenter.segment(buffer)? {
            SegmentationResult::Success(boxes) => boxes,
            SegmentationResult::Failure => {
                report.failed_segmentations += 1;
                continue;
            }
        };
        report.segmented += 1;

        let stem = buffer.stem().unwrap_or_default();
        let extracted = ground_truth_label(stem, boxes.len())
            .and_then(|label| extractor.extract(buffer, &boxes, &label));
        match extracted {
            Ok(characters) => report.characters_written += characters.len(),
            Err(err) => tracing::warn!(
                file = buffer.filename().unwrap_or_default(),
                stage = "extraction",
                error = %err,
                "Skipping sample"
            ),
        }
    }

    report.total_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        style = %report.style,
        processed = report.processed,
        skipped = report.skipped,
        segmented = report.segmented,
        failed = report.failed_segmentations,
        characters = report.characters_written,
        threshold = report.threshold,
        total_time_ms = report.total_time_ms,
        "Batch finished"
    );

    Ok(report)
}

/// Import, clean and pre-segment one sample, saving the cleaned image.
fn prepare(
    style: &StyleConfig,
    pre_segmentation: &Pipeline,
    folder: &Path,
    path: &Path,
) -> Result<RasterBuffer, (&'static str, CaptchaError)> {
    let buffer = RasterBuffer::open(path).map_err(|e| ("import", e))?;
    let cleaned = style.pipeline().run(buffer).map_err(|e| ("cleaning", e))?;
    cleaned
        .save(&folder.join(CLEANED_DIR))
        .map_err(|e| ("save", e))?;

    let prepared = pre_segmentation
        .run(cleaned)
        .map_err(|e| ("pre-segmentation", e))?;
    if style.preview() {
        prepared
            .save(&folder.join(PREVIEW_DIR))
            .map_err(|e| ("preview", e))?;
    }
    Ok(prepared)
}

fn skip(path: &Path, stage: &str, err: &CaptchaError) {
    tracing::warn!(file = %path.display(), stage, error = %err, "Skipping sample");
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const STYLE: &str = r#"{
        "folder": "demo/",
        "functions": [{"grey": []}, {"threshold": [100]}],
        "captcha_length": [3, 3]
    }"#;

    /// Three glyphs on a dark background; `merged` joins the first two.
    fn write_sample(folder: &Path, name: &str, widths: [u32; 3], merged: bool) {
        let mut img = RgbImage::new(90, 30);
        let mut x0 = 5;
        for (i, w) in widths.into_iter().enumerate() {
            for y in 8..22 {
                for x in x0..x0 + w {
                    img.put_pixel(x, y, Rgb([220, 220, 220]));
                }
            }
            x0 += w + if merged && i == 0 { 0 } else { 8 };
        }
        img.save(folder.join(name)).unwrap();
    }

    fn setup() -> (tempfile::TempDir, StyleConfig) {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("demo");
        std::fs::create_dir_all(&folder).unwrap();

        let style_path = dir.path().join("demo.json");
        std::fs::write(&style_path, STYLE).unwrap();
        let style = StyleConfig::load(&style_path).unwrap();
        (dir, style)
    }

    #[test]
    fn test_process_style_end_to_end() {
        let (dir, mut style) = setup();
        let folder = dir.path().join("demo");

        for i in 0..24 {
            let widths = if i % 2 == 0 { [7, 7, 7] } else { [6, 8, 7] };
            write_sample(&folder, &format!("AbC_{:02}.png", i), widths, false);
        }
        // Two touching glyphs: one 14 px wide box, 1.0 aspect, among 0.5 glyphs
        write_sample(&folder, "Kx7_merged.png", [7, 7, 7], true);
        std::fs::write(folder.join("broken.png"), b"not an image").unwrap();

        let report = process_style(dir.path(), &mut style).unwrap();

        assert_eq!(report.processed, 25);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.threshold, 1.0);
        assert_eq!(report.segmented, 24);
        assert_eq!(report.failed_segmentations, 1);
        assert_eq!(report.characters_written, 72);

        assert!(folder.join("cleaned/AbC_00.png").exists());
        assert!(folder.join("characters/A/24.png").exists());
        assert!(!folder.join("characters/A/25.png").exists());
        assert!(!folder.join("preview").exists());

        let stored = StyleConfig::load(style.path().unwrap()).unwrap();
        assert_eq!(stored.threshold(), Some(1.0));
    }

    #[test]
    fn test_empty_folder_is_an_error() {
        let (dir, mut style) = setup();
        assert!(matches!(
            process_style(dir.path(), &mut style),
            Err(CaptchaError::Config(_))
        ));
    }
}
