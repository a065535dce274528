//! Contour analysis, merge-threshold calibration, segmentation and
//! character extraction.

pub mod calibration;
pub mod contours;
pub mod extractor;
pub mod segmenter;

pub use calibration::{calibrate, OutlierCalibrator};
pub use contours::{BoundingBox, Contour, ContourIndex};
pub use extractor::{CharacterExtractor, LabelCounters, LabeledCharacter};
pub use segmenter::{CharCountRange, SegmentationResult, Segmenter};
