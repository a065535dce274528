//! Cropping and persisting labelled character samples.

use super::contours::BoundingBox;
use crate::error::CaptchaError;
use crate::raster::RasterBuffer;
use image::GrayImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Pixels added on every side of a box before cropping.
pub const CROP_MARGIN: u32 = 2;

/// Characters generated CAPTCHAs are drawn from. Visually ambiguous glyphs
/// (`0/O`, `1/I/l`, `i/j`, ...) are left out.
pub const CAPTCHA_ALPHABET: &str = "ABCDEFGKMNPQRSTUVWXYZabcdefghkmnpqrstuvwxyz23456789";

/// One cropped glyph and its ground-truth character.
#[derive(Debug, Clone)]
pub struct LabeledCharacter {
    pub image: GrayImage,
    pub label: char,
    /// Sequence number within `label`, starting at 1.
    pub sequence: u32,
    /// Where the sample was written, if it was persisted.
    pub path: Option<PathBuf>,
}

/// Next free sequence number per label character for one extraction run.
#[derive(Debug, Default)]
pub struct LabelCounters {
    counters: Mutex<HashMap<char, u32>>,
}

impl LabelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next number for `label`. The first claim for a label
    /// resumes after the highest `<n>.png` already present in `existing`.
    pub fn next(&self, label: char, existing: Option<&Path>) -> u32 {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let last = counters
            .entry(label)
            .or_insert_with(|| existing.map(highest_sample_number).unwrap_or(0));
        *last += 1;
        *last
    }

    pub fn current(&self, label: char) -> u32 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.get(&label).copied().unwrap_or(0)
    }
}

fn highest_sample_number(dir: &Path) -> u32 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != "png" {
                return None;
            }
            path.file_stem()?.to_str()?.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

/// Crops segmented boxes and files them by label.
#[derive(Debug, Default)]
pub struct CharacterExtractor {
    output_dir: Option<PathBuf>,
    counters: LabelCounters,
}

impl CharacterExtractor {
    /// Persist samples to `<output_dir>/<label>/<n>.png`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
            counters: LabelCounters::new(),
        }
    }

    /// Number samples without writing them anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn counters(&self) -> &LabelCounters {
        &self.counters
    }

    /// Pair box `i` with character `i` of `label`, crop and persist each.
    /// Extra label characters are ignored. A rejected label or box leaves
    /// no files behind and no sequence numbers claimed.
    pub fn extract(
        &self,
        buffer: &RasterBuffer,
        boxes: &[BoundingBox],
        label: &str,
    ) -> Result<Vec<LabeledCharacter>, CaptchaError> {
        let chars: Vec<char> = label.chars().collect();
        if chars.len() < boxes.len() {
            return Err(CaptchaError::Label(format!(
                "label {:?} has {} characters but {} boxes were segmented",
                label,
                chars.len(),
                boxes.len()
            )));
        }

        // Validate and crop everything before claiming numbers or writing files
        let mut crops = Vec::with_capacity(boxes.len());
        for (bounds, &ch) in boxes.iter().zip(&chars) {
            if !ch.is_ascii_alphanumeric() {
                return Err(CaptchaError::Label(format!(
                    "character {:?} of label {:?} is not alphanumeric",
                    ch, label
                )));
            }
            if !CAPTCHA_ALPHABET.contains(ch) {
                tracing::warn!(label, character = %ch, "Label character outside the CAPTCHA alphabet");
            }

            let image = crop_with_margin(buffer, bounds).ok_or_else(|| {
                CaptchaError::Image(format!(
                    "box {:?} lies outside the {}x{} image",
                    bounds,
                    buffer.width(),
                    buffer.height()
                ))
            })?;
            crops.push((ch, image));
        }

        let mut characters = Vec::with_capacity(crops.len());
        for (ch, image) in crops {
            let label_dir = self.output_dir.as_ref().map(|dir| dir.join(ch.to_string()));
            let sequence = self.counters.next(ch, label_dir.as_deref());

            let path = match label_dir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir).map_err(|e| CaptchaError::io(&dir, e))?;
                    let path = dir.join(format!("{}.png", sequence));
                    image.save(&path).map_err(|e| {
                        CaptchaError::Image(format!("Failed to save {}: {}", path.display(), e))
                    })?;
                    Some(path)
                }
                None => None,
            };

            characters.push(LabeledCharacter {
                image,
                label: ch,
                sequence,
                path,
            });
        }

        tracing::debug!(label, count = characters.len(), "Characters extracted");
        Ok(characters)
    }
}

/// Crop `bounds` grown by [`CROP_MARGIN`] and clamped to the image.
pub fn crop_with_margin(buffer: &RasterBuffer, bounds: &BoundingBox) -> Option<GrayImage> {
    let (width, height) = buffer.dimensions();
    let region = bounds.expand_within(CROP_MARGIN, width, height)?;
    let cropped = buffer
        .image()
        .crop_imm(region.x(), region.y(), region.width(), region.height());
    Some(cropped.into_luma8())
}

/// Ground truth for a sample: the first `count` characters of its file stem.
pub fn ground_truth_label(stem: &str, count: usize) -> Result<String, CaptchaError> {
    let label: String = stem.chars().take(count).collect();
    if label.chars().count() < count {
        return Err(CaptchaError::Label(format!(
            "file name {:?} is shorter than the {} segmented characters",
            stem, count
        )));
    }
    Ok(label)
}
