use super::contours::{BoundingBox, ContourIndex};
use crate::error::CaptchaError;
use crate::raster::RasterBuffer;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Inclusive range of characters a CAPTCHA of one style may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 2]", into = "[usize; 2]")]
pub struct CharCountRange {
    min: usize,
    max: usize,
}

impl CharCountRange {
    pub fn new(min: usize, max: usize) -> Result<Self, CaptchaError> {
        if min == 0 || min > max {
            return Err(CaptchaError::Config(format!(
                "character count range must satisfy 1 <= min <= max, got [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn exact(count: usize) -> Result<Self, CaptchaError> {
        Self::new(count, count)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl TryFrom<[usize; 2]> for CharCountRange {
    type Error = CaptchaError;

    fn try_from([min, max]: [usize; 2]) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<CharCountRange> for [usize; 2] {
    fn from(range: CharCountRange) -> Self {
        [range.min, range.max]
    }
}

/// Outcome of segmenting one image. A failure is an expected result for
/// malformed input, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationResult {
    /// Character boxes in reading order (ascending `x`).
    Success(Vec<BoundingBox>),
    Failure,
}

impl SegmentationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn boxes(&self) -> Option<&[BoundingBox]> {
        match self {
            Self::Success(boxes) => Some(boxes),
            Self::Failure => None,
        }
    }
}

/// Cuts a pre-segmented image into character boxes for one style.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    range: CharCountRange,
    merge_threshold: f64,
}

impl Segmenter {
    pub fn new(range: CharCountRange, merge_threshold: f64) -> Self {
        Self {
            range,
            merge_threshold,
        }
    }

    pub fn range(&self) -> CharCountRange {
        self.range
    }

    pub fn merge_threshold(&self) -> f64 {
        self.merge_threshold
    }

    pub fn segment(&self, buffer: &RasterBuffer) -> Result<SegmentationResult, CaptchaError> {
        let gray = buffer.as_gray().ok_or_else(|| {
            CaptchaError::invalid_operation(
                "segment",
                format!("[{}, {}]", self.range.min, self.range.max),
                format!(
                    "segmentation requires a single-channel image, found {} channels",
                    buffer.channels()
                ),
            )
        })?;
        Ok(segment(gray, self.range, self.merge_threshold))
    }
}

/// Segment a binarised image into at most `range.max()` character boxes.
///
/// Regions are visited heaviest first; any box wider than
/// `merge_threshold × height` is taken to be two touching characters and
/// split down the middle. Boxes stop being collected once `range.max()` are
/// held, so a late split may contribute only its left half.
pub fn segment(image: &GrayImage, range: CharCountRange, merge_threshold: f64) -> SegmentationResult {
    let ranked = ContourIndex::build(image).rank(range.max);

    let mut boxes = Vec::with_capacity(range.max);
    for candidate in ranked {
        if boxes.len() == range.max {
            break;
        }

        match candidate.split_halves() {
            Some((left, right)) if candidate.aspect_ratio() > merge_threshold => {
                boxes.push(left);
                if boxes.len() < range.max {
                    boxes.push(right);
                }
            }
            _ => boxes.push(candidate),
        }
    }

    boxes.sort_by_key(|b| b.x());

    if range.contains(boxes.len()) {
        tracing::debug!(count = boxes.len(), "Segmentation succeeded");
        SegmentationResult::Success(boxes)
    } else {
        tracing::debug!(
            count = boxes.len(),
            min = range.min,
            max = range.max,
            "Segmentation failed: character count out of range"
        );
        SegmentationResult::Failure
    }
}
