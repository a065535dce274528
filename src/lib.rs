//! Cleaning, calibration and character segmentation for text CAPTCHAs.
//!
//! A style's `functions` list becomes a [`Pipeline`] of raster operations.
//! Cleaned samples of the style are pooled by the [`OutlierCalibrator`] to
//! learn how wide two touching characters look, and the [`Segmenter`] uses
//! that threshold to cut each image into ordered character boxes for the
//! [`CharacterExtractor`] or a [`Classifier`].

pub mod batch;
pub mod classifier;
pub mod classifiers;
pub mod config;
pub mod error;
pub mod predict;
pub mod preprocessing;
pub mod raster;
pub mod segmentation;
pub mod server;
pub mod style;

pub use classifier::{Classifier, ClassifierLoader, ClassifierRegistry};
pub use error::CaptchaError;
pub use classifiers::TemplateClassifier;
pub use predict::{evaluate_accuracy, AccuracyReport, ImageInput, Prediction, Predictor};
pub use preprocessing::{Operation, Pipeline};
pub use raster::RasterBuffer;
pub use segmentation::{
    BoundingBox, CharCountRange, CharacterExtractor, ContourIndex, OutlierCalibrator,
    SegmentationResult, Segmenter,
};
pub use style::{StyleConfig, StyleStore};
