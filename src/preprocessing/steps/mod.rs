//! Individual raster operations

pub mod blur;
pub mod border;
pub mod equalise;
pub mod fill_holes;
pub mod grayscale;
pub mod line_removal;
pub mod morphology;
pub mod remove_contours;
pub mod resize;
pub mod threshold;
