pub mod inference;
pub mod model_manager;

use crate::error::AppError;
use crate::models::classify_types::{Classification, ModelStatus};
use std::path::Path;

/// Anything that can turn an image file on disk into a class distribution.
pub trait Classifier: Send + Sync {
    fn predict(&self, image_path: &Path) -> Result<Classification, AppError>;

    fn status(&self) -> ModelStatus;
}
