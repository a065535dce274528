//! Character classifiers consumed at prediction time.
//!
//! Recognising a glyph is left to an external model. This module defines
//! the seam: a [`Classifier`] handle per style, built on first use by a
//! [`ClassifierLoader`] and cached by a [`ClassifierRegistry`].

use crate::error::CaptchaError;
use crate::style::StyleConfig;
use image::GrayImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Trait that all character classifiers must implement
pub trait Classifier: Send + Sync {
    /// Returns the classifier identifier
    fn name(&self) -> &'static str;

    /// Glyph size the model was trained on, `(width, height)`.
    fn input_size(&self) -> (u32, u32);

    /// Recognise one glyph already resized to `expected_size`.
    fn classify(&self, glyph: &GrayImage, expected_size: (u32, u32)) -> Result<char, CaptchaError>;
}

/// Builds the classifier for a style, typically from its
/// `model_filename`/`label_filename`.
pub trait ClassifierLoader: Send + Sync {
    fn load(&self, style: &StyleConfig) -> Result<Arc<dyn Classifier>, CaptchaError>;
}

impl<F> ClassifierLoader for F
where
    F: Fn(&StyleConfig) -> Result<Arc<dyn Classifier>, CaptchaError> + Send + Sync,
{
    fn load(&self, style: &StyleConfig) -> Result<Arc<dyn Classifier>, CaptchaError> {
        self(style)
    }
}

/// Lazily loaded classifiers keyed by style name
pub struct ClassifierRegistry {
    loader: Box<dyn ClassifierLoader>,
    loaded: Mutex<HashMap<String, Arc<dyn Classifier>>>,
}

impl ClassifierRegistry {
    pub fn new(loader: impl ClassifierLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Get the classifier for `style`, loading it on first request
    pub fn get(&self, style: &StyleConfig) -> Result<Arc<dyn Classifier>, CaptchaError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(classifier) = loaded.get(style.name()) {
            return Ok(Arc::clone(classifier));
        }

        tracing::info!(style = style.name(), "Loading classifier...");
        let classifier = self.loader.load(style)?;
        tracing::info!(
            style = style.name(),
            classifier = classifier.name(),
            "Classifier ready"
        );
        loaded.insert(style.name().to_string(), Arc::clone(&classifier));
        Ok(classifier)
    }

    /// Styles whose classifier is already loaded
    pub fn list(&self) -> Vec<String> {
        let loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = loaded.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ClassifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierRegistry")
            .field("loaded", &self.list())
            .finish_non_exhaustive()
    }
}
