//! Built-in [`Classifier`](crate::Classifier) implementations.

pub mod template;

pub use template::{template_loader, TemplateClassifier};
