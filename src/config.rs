use crate::error::AppError;
use crate::models::classify_types::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "best.onnx";
pub const DEFAULT_LABELS_PATH: &str = "best.json";
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub verdicts: VerdictConfig,
    /// Where upload temp files go. Falls back to the OS temp dir.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub body_limit_bytes: usize,
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            body_limit_bytes: 64 * 1024 * 1024,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// How to read the model's single output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Already softmaxed (YOLOv8 classification exports).
    Probabilities,
    /// Raw scores, softmax is applied here.
    Logits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub input_size: u32,
    pub crop_pct: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub output: OutputKind,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: PathBuf::from(DEFAULT_LABELS_PATH),
            input_size: 224,
            crop_pct: 1.0,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
            output: OutputKind::Probabilities,
            intra_threads: 4,
        }
    }
}

/// Maps class names (case-insensitive) to verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    pub classes: BTreeMap<String, Verdict>,
    pub fallback: Verdict,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert("feasible".to_string(), Verdict::Feasible);
        Self {
            classes,
            fallback: Verdict::Infeasible,
        }
    }
}

impl VerdictConfig {
    pub fn verdict_for(&self, class_name: &str) -> Verdict {
        self.classes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(class_name))
            .map(|(_, verdict)| *verdict)
            .unwrap_or(self.fallback)
    }
}

impl AppConfig {
    /// Loads a JSON config file. A missing path means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content).map_err(|e| {
                    AppError::Config(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
            None => AppConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.max_batch_size == 0 {
            return Err(AppError::Config("server.max_batch_size must be at least 1".into()));
        }
        if self.model.input_size == 0 {
            return Err(AppError::Config("model.input_size must be positive".into()));
        }
        if !(self.model.crop_pct > 0.0 && self.model.crop_pct <= 1.0) {
            return Err(AppError::Config("model.crop_pct must be in (0, 1]".into()));
        }
        if self.model.std.iter().any(|s| !(*s > 0.0)) {
            return Err(AppError::Config("model.std values must be positive".into()));
        }
        Ok(())
    }
}
