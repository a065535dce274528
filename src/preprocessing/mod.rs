//! Image cleaning for CAPTCHA segmentation
//!
//! Provides configurable pipelines of raster operations driven by the
//! `functions` list of a style configuration.

pub mod operation;
pub mod pipeline;
pub mod steps;

pub use operation::Operation;
pub use pipeline::{Pipeline, PipelineResult, PipelineStep, StepTiming};
