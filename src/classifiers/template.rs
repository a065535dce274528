use crate::batch::CHARACTERS_DIR;
use crate::classifier::{Classifier, ClassifierLoader};
use crate::error::CaptchaError;
use crate::preprocessing::steps::resize;
use crate::style::StyleConfig;
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Nearest-neighbour classifier over extracted character samples.
///
/// Every `<dir>/<c>/<n>.png` written by the extractor becomes a template for
/// `c`. A glyph is read as the character of the template with the smallest
/// sum of squared pixel differences.
#[derive(Debug)]
pub struct TemplateClassifier {
    size: (u32, u32),
    templates: Vec<(char, GrayImage)>,
}

impl TemplateClassifier {
    pub fn from_templates(
        size: (u32, u32),
        templates: impl IntoIterator<Item = (char, GrayImage)>,
    ) -> Self {
        let templates = templates
            .into_iter()
            .map(|(label, image)| (label, fit(image, size)))
            .collect();
        Self { size, templates }
    }

    /// Load every sample under `dir`. Folders whose name is not exactly one
    /// character are ignored; unreadable images are logged and skipped.
    pub fn from_dir(dir: &Path, size: (u32, u32)) -> Result<Self, CaptchaError> {
        let mut templates = Vec::new();
        for label_dir in sorted_entries(dir)? {
            let Some(label) = single_char(&label_dir) else {
                continue;
            };
            if !label_dir.is_dir() {
                continue;
            }

            for path in sorted_entries(&label_dir)? {
                if path.extension().and_then(|e| e.to_str()) != Some("png") {
                    continue;
                }
                match image::open(&path) {
                    Ok(image) => templates.push((label, image.into_luma8())),
                    Err(err) => {
                        tracing::warn!(file = %path.display(), error = %err, "Skipping template")
                    }
                }
            }
        }

        if templates.is_empty() {
            return Err(CaptchaError::Classification(format!(
                "no character samples found in {}",
                dir.display()
            )));
        }

        tracing::debug!(dir = %dir.display(), templates = templates.len(), "Templates loaded");
        Ok(Self::from_templates(size, templates))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Classifier for TemplateClassifier {
    fn name(&self) -> &'static str {
        "template"
    }

    fn input_size(&self) -> (u32, u32) {
        self.size
    }

    fn classify(&self, glyph: &GrayImage, expected_size: (u32, u32)) -> Result<char, CaptchaError> {
        if expected_size != self.size || glyph.dimensions() != self.size {
            return Err(CaptchaError::Classification(format!(
                "glyph is {:?} but templates are {:?}",
                glyph.dimensions(),
                self.size
            )));
        }

        self.templates
            .iter()
            .min_by_key(|(_, template)| distance(glyph, template))
            .map(|(label, _)| *label)
            .ok_or_else(|| CaptchaError::Classification("no templates loaded".to_string()))
    }
}

/// Loads a [`TemplateClassifier`] from `<data_dir>/<folder>/characters` of
/// each style, the layout `process` writes.
pub fn template_loader(data_dir: PathBuf, size: (u32, u32)) -> impl ClassifierLoader {
    move |style: &StyleConfig| -> Result<Arc<dyn Classifier>, CaptchaError> {
        let dir = data_dir.join(style.folder()).join(CHARACTERS_DIR);
        Ok(Arc::new(TemplateClassifier::from_dir(&dir, size)?))
    }
}

fn fit(image: GrayImage, size: (u32, u32)) -> GrayImage {
    if image.dimensions() == size {
        return image;
    }
    resize::apply(DynamicImage::ImageLuma8(image), size.0, size.1).into_luma8()
}

fn distance(a: &GrayImage, b: &GrayImage) -> u64 {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&p, &q)| {
            let d = p.abs_diff(q) as u64;
            d * d
        })
        .sum()
}

fn single_char(path: &Path) -> Option<char> {
    let mut chars = path.file_name()?.to_str()?.chars();
    let label = chars.next()?;
    chars.next().is_none().then_some(label)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CaptchaError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CaptchaError::io(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    Ok(paths)
}
