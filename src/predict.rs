//! End-to-end prediction of CAPTCHA text and accuracy evaluation over
//! labelled samples.

use crate::classifier::ClassifierRegistry;
use crate::error::CaptchaError;
use crate::preprocessing::steps::resize;
use crate::preprocessing::Pipeline;
use crate::raster::RasterBuffer;
use crate::segmentation::extractor::crop_with_margin;
use crate::segmentation::{SegmentationResult, Segmenter};
use crate::style::StyleConfig;
use image::DynamicImage;
use serde::Serialize;
use std::path::PathBuf;

/// A CAPTCHA handed to the predictor: a file, or the encoded image itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Path(PathBuf),
    Base64(String),
}

impl ImageInput {
    /// Values containing a `.` are file paths. Base64 never contains one.
    pub fn parse(value: &str) -> Self {
        if value.contains('.') {
            Self::Path(PathBuf::from(value))
        } else {
            Self::Base64(value.to_string())
        }
    }

    pub fn load(&self) -> Result<RasterBuffer, CaptchaError> {
        match self {
            Self::Path(path) => RasterBuffer::open(path),
            Self::Base64(encoded) => RasterBuffer::from_base64(encoded),
        }
    }
}

/// Text read from one CAPTCHA, or the sentinel for "no prediction".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Prediction {
    Text(String),
    Failed,
}

impl Prediction {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Failed => None,
        }
    }

    /// Case-insensitive match against a sample's file name.
    pub fn matches(&self, filename: &str) -> bool {
        match self {
            Self::Text(text) => filename.to_lowercase().contains(&text.to_lowercase()),
            Self::Failed => false,
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Runs clean-up, segmentation and classification for any loaded style.
#[derive(Debug)]
pub struct Predictor {
    classifiers: ClassifierRegistry,
    pre_segmentation: Pipeline,
}

impl Predictor {
    pub fn new(classifiers: ClassifierRegistry) -> Self {
        Self {
            classifiers,
            pre_segmentation: Pipeline::pre_segmentation(),
        }
    }

    pub fn classifiers(&self) -> &ClassifierRegistry {
        &self.classifiers
    }

    /// Read the characters of one imported CAPTCHA. A segmentation that
    /// yields the wrong character count is [`Prediction::Failed`], not an
    /// error; a style without a calibrated threshold is.
    pub fn predict(
        &self,
        style: &StyleConfig,
        buffer: RasterBuffer,
    ) -> Result<Prediction, CaptchaError> {
        let segmenter = Segmenter::new(style.captcha_length(), style.require_threshold()?);
        let cleaned = style.pipeline().run(buffer)?;
        let prepared = self.pre_segmentation.run(cleaned)?;

        let boxes = match segmenter.segment(&prepared)? {
            SegmentationResult::Success(boxes) => boxes,
            SegmentationResult::Failure => {
                tracing::debug!(file = ?prepared.filename(), "No prediction: segmentation failed");
                return Ok(Prediction::Failed);
            }
        };

        let classifier = self.classifiers.get(style)?;
        let size = classifier.input_size();

        let mut text = String::with_capacity(boxes.len());
        for bounds in &boxes {
            let glyph = crop_with_margin(&prepared, bounds).ok_or_else(|| {
                CaptchaError::Internal(format!("segmented box {:?} is outside the image", bounds))
            })?;
            let glyph = resize::apply(DynamicImage::ImageLuma8(glyph), size.0, size.1).into_luma8();
            text.push(classifier.classify(&glyph, size)?);
        }

        Ok(Prediction::Text(text))
    }
}

/// Outcome of predicting a set of labelled samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyReport {
    pub total: usize,
    pub correct: usize,
    /// Segmentation produced no prediction.
    pub failed: usize,
    /// A prediction was made but does not match the file name.
    pub wrong: usize,
    /// The sample could not be read or processed.
    pub errors: usize,
}

impl AccuracyReport {
    pub fn skipped(&self) -> usize {
        self.failed + self.wrong
    }

    pub fn accuracy_percent(&self) -> f64 {
        percent(self.correct, self.total)
    }

    pub fn skipped_percent(&self) -> f64 {
        percent(self.skipped(), self.total)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Predict every sample and compare against the ground truth in its name.
/// Unreadable samples are logged and counted as errors.
pub fn evaluate_accuracy(
    predictor: &Predictor,
    style: &StyleConfig,
    samples: &[PathBuf],
) -> Result<AccuracyReport, CaptchaError> {
    // Fail fast on configuration problems before touching any sample.
    style.require_threshold()?;

    let mut report = AccuracyReport::default();
    for path in samples {
        report.total += 1;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let prediction = RasterBuffer::open(path).and_then(|buffer| predictor.predict(style, buffer));
        match prediction {
            Ok(prediction) if prediction.matches(&filename) => report.correct += 1,
            Ok(Prediction::Failed) => report.failed += 1,
            Ok(prediction) => {
                tracing::debug!(file = %filename, %prediction, "Wrong prediction");
                report.wrong += 1;
            }
            Err(err @ (CaptchaError::Config(_) | CaptchaError::Classification(_))) => {
                return Err(err)
            }
            Err(err) => {
                tracing::warn!(file = %filename, error = %err, "Skipping sample");
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        style = style.name(),
        total = report.total,
        correct = report.correct,
        accuracy = format!("{:.2}%", report.accuracy_percent()),
        "Accuracy evaluated"
    );
    Ok(report)
}
