//! Per-style JSON configuration.

use crate::error::CaptchaError;
use crate::preprocessing::Pipeline;
use crate::segmentation::CharCountRange;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct StyleFile {
    folder: String,
    #[serde(default)]
    functions: Vec<Map<String, Value>>,
    captcha_length: CharCountRange,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    model_filename: Option<String>,
    #[serde(default)]
    label_filename: Option<String>,
    #[serde(default)]
    preview: bool,
}

/// One CAPTCHA style: where its samples live, how to clean them and how
/// many characters to expect.
#[derive(Debug, Clone)]
pub struct StyleConfig {
    name: String,
    path: Option<PathBuf>,
    raw: Map<String, Value>,
    folder: String,
    pipeline: Pipeline,
    captcha_length: CharCountRange,
    threshold: Option<f64>,
    model_filename: Option<String>,
    label_filename: Option<String>,
    preview: bool,
}

impl StyleConfig {
    /// Parse a style document. The pipeline is validated here, so a bad
    /// operation name fails before any image is touched.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, CaptchaError> {
        let name = name.into();
        let raw: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| CaptchaError::Config(format!("style {}: {}", name, e)))?;
        let file: StyleFile = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| CaptchaError::Config(format!("style {}: {}", name, e)))?;

        let pipeline = Pipeline::from_config(&file.functions)?;

        Ok(Self {
            name,
            path: None,
            raw,
            folder: file.folder,
            pipeline,
            captcha_length: file.captcha_length,
            threshold: file.threshold,
            model_filename: file.model_filename,
            label_filename: file.label_filename,
            preview: file.preview,
        })
    }

    /// Load `path`, naming the style after the file stem.
    pub fn load(path: &Path) -> Result<Self, CaptchaError> {
        let json = std::fs::read_to_string(path).map_err(|e| CaptchaError::io(path, e))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut style = Self::from_json(name, &json)?;
        style.path = Some(path.to_path_buf());
        Ok(style)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn captcha_length(&self) -> CharCountRange {
        self.captcha_length
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn model_filename(&self) -> Option<&str> {
        self.model_filename.as_deref()
    }

    pub fn label_filename(&self) -> Option<&str> {
        self.label_filename.as_deref()
    }

    /// Whether intermediate images should be kept for inspection.
    pub fn preview(&self) -> bool {
        self.preview
    }

    /// The calibrated merge threshold, required for segmentation.
    pub fn require_threshold(&self) -> Result<f64, CaptchaError> {
        self.threshold.ok_or_else(|| {
            CaptchaError::Config(format!(
                "style {} has no calibrated threshold; run `process` first",
                self.name
            ))
        })
    }

    /// Record a calibrated threshold and rewrite the style file, leaving
    /// every other field and the key order untouched.
    pub fn store_threshold(&mut self, threshold: f64) -> Result<(), CaptchaError> {
        let number = serde_json::Number::from_f64(threshold).ok_or_else(|| {
            CaptchaError::Calibration(format!("threshold {} is not a finite number", threshold))
        })?;
        self.raw.insert("threshold".to_string(), Value::Number(number));
        self.threshold = Some(threshold);

        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&self.raw)
                .map_err(|e| CaptchaError::Internal(e.to_string()))?;
            std::fs::write(path, json).map_err(|e| CaptchaError::io(path, e))?;
            tracing::info!(style = %self.name, threshold, path = %path.display(), "Threshold stored");
        }
        Ok(())
    }
}

/// All styles of a directory, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct StyleStore {
    styles: BTreeMap<String, StyleConfig>,
}

impl StyleStore {
    /// Load every `*.json` file directly inside `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, CaptchaError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CaptchaError::io(dir, e))?;

        let mut styles = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|e| CaptchaError::io(dir, e))?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let style = StyleConfig::load(&path)?;
            tracing::debug!(style = style.name(), steps = style.pipeline().len(), "Style loaded");
            styles.insert(style.name().to_string(), style);
        }

        if styles.is_empty() {
            return Err(CaptchaError::Config(format!(
                "no style files found in {}",
                dir.display()
            )));
        }

        tracing::info!(count = styles.len(), dir = %dir.display(), "Styles loaded");
        Ok(Self { styles })
    }

    pub fn from_styles(styles: impl IntoIterator<Item = StyleConfig>) -> Self {
        Self {
            styles: styles
                .into_iter()
                .map(|style| (style.name().to_string(), style))
                .collect(),
        }
    }

    /// Look up a style by name; a trailing `.json` is ignored.
    pub fn get(&self, name: &str) -> Result<&StyleConfig, CaptchaError> {
        let key = name.strip_suffix(".json").unwrap_or(name);
        self.styles
            .get(key)
            .ok_or_else(|| CaptchaError::Config(format!("unknown style: {}", name)))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut StyleConfig, CaptchaError> {
        let key = name.strip_suffix(".json").unwrap_or(name);
        self.styles
            .get_mut(key)
            .ok_or_else(|| CaptchaError::Config(format!("unknown style: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.styles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleConfig> {
        self.styles.values()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLE: &str = r#"{
        "folder": "captcha_01/",
        "functions": [{"grey": []}, {"threshold": [127]}],
        "preview": false,
        "captcha_length": [4, 4],
        "model_filename": "captcha_01.model",
        "label_filename": "captcha_01.labels"
    }"#;

    #[test]
    fn test_parse_style() {
        let style = StyleConfig::from_json("captcha_01", STYLE).unwrap();
        assert_eq!(style.folder(), "captcha_01/");
        assert_eq!(style.pipeline().len(), 2);
        assert_eq!(style.captcha_length(), CharCountRange::exact(4).unwrap());
        assert_eq!(style.threshold(), None);
        assert!(style.require_threshold().is_err());
    }

    #[test]
    fn test_bad_operation_fails_at_load() {
        let json = STYLE.replace("threshold\": [127]", "wobble\": [1]");
        assert!(matches!(
            StyleConfig::from_json("bad", &json),
            Err(CaptchaError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_bad_length_range_fails() {
        let json = STYLE.replace("[4, 4]", "[5, 4]");
        assert!(matches!(
            StyleConfig::from_json("bad", &json),
            Err(CaptchaError::Config(_))
        ));
    }

    #[test]
    fn test_store_threshold_preserves_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captcha_01.json");
        std::fs::write(&path, STYLE).unwrap();

        let mut style = StyleConfig::load(&path).unwrap();
        style.store_threshold(1.83).unwrap();

        let reloaded = StyleConfig::load(&path).unwrap();
        assert_eq!(reloaded.threshold(), Some(1.83));
        assert_eq!(reloaded.model_filename(), Some("captcha_01.model"));

        let text = std::fs::read_to_string(&path).unwrap();
        let folder_at = text.find("\"folder\"").unwrap();
        let threshold_at = text.rfind("\"threshold\"").unwrap();
        let labels_at = text.find("\"label_filename\"").unwrap();
        assert!(folder_at < labels_at && labels_at < threshold_at);
    }

    #[test]
    fn test_store_loads_json_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("captcha_01.json"), STYLE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a style").unwrap();

        let store = StyleStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.names(), vec!["captcha_01"]);
        assert!(store.get("captcha_01.json").is_ok());
        assert!(store.get("captcha_02").is_err());
    }

    #[test]
    fn test_empty_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StyleStore::load_dir(dir.path()),
            Err(CaptchaError::Config(_))
        ));
    }
}
