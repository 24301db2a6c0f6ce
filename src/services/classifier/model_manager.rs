use crate::config::{ModelConfig, OutputKind};
use crate::error::AppError;
use crate::models::classify_types::{Classification, ModelStatus};
use crate::services::classifier::inference::{self, Preprocess};
use crate::services::classifier::Classifier;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

pub type OnnxSession = Session;

/// The loaded classifier. Built once at startup and shared read-only;
/// the mutex exists only because a forward pass needs `&mut Session`.
pub struct ModelService {
    model_path: PathBuf,
    labels: Vec<String>,
    preprocess: Preprocess,
    output: OutputKind,
    session: Mutex<OnnxSession>,
}

/// Loads the ONNX artifact and its label file. Any failure here is fatal.
pub fn load_model(config: &ModelConfig) -> Result<ModelService, AppError> {
    let start = Instant::now();

    if !config.model_path.exists() {
        return Err(AppError::ModelLoad(format!(
            "model artifact {} not found",
            config.model_path.display()
        )));
    }
    let labels = load_labels(&config.labels_path)?;

    let _ = ort::init().with_name("route-feasibility").commit();

    let session = Session::builder()
        .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(config.intra_threads)
        .map_err(|e| AppError::ModelLoad(format!("Failed to set intra threads: {}", e)))?
        .commit_from_file(&config.model_path)
        .map_err(|e| {
            AppError::ModelLoad(format!(
                "Failed to load ONNX model {}: {}",
                config.model_path.display(),
                e
            ))
        })?;

    info!(
        path = %config.model_path.display(),
        classes = labels.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "model loaded"
    );

    Ok(ModelService {
        model_path: config.model_path.clone(),
        labels,
        preprocess: Preprocess::from(config),
        output: config.output,
        session: Mutex::new(session),
    })
}

/// Reads class names from a label file.
///
/// Accepts either a config-style object with an `id2label` map or a plain
/// array of names in index order.
pub fn load_labels(path: &Path) -> Result<Vec<String>, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::ModelLoad(format!("Failed to read label file {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        AppError::ModelLoad(format!("Failed to parse label file {}: {}", path.display(), e))
    })?;
    let labels = parse_labels(&value)?;
    debug!(path = %path.display(), ?labels, "labels loaded");
    Ok(labels)
}

fn parse_labels(value: &serde_json::Value) -> Result<Vec<String>, AppError> {
    let labels: Vec<String> = if let Some(names) = value.as_array() {
        names
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::ModelLoad(format!("label {} is not a string", v)))
            })
            .collect::<Result<_, _>>()?
    } else {
        let id2label = value["id2label"]
            .as_object()
            .ok_or_else(|| AppError::ModelLoad("Label file missing id2label field".to_string()))?;

        let mut indexed = id2label
            .iter()
            .map(|(k, v)| {
                let idx = k
                    .parse::<usize>()
                    .map_err(|_| AppError::ModelLoad(format!("invalid class index {:?}", k)))?;
                let label = v
                    .as_str()
                    .ok_or_else(|| AppError::ModelLoad(format!("label for {} is not a string", k)))?
                    .to_string();
                Ok((idx, label))
            })
            .collect::<Result<Vec<(usize, String)>, AppError>>()?;
        indexed.sort_by_key(|(idx, _)| *idx);
        // Output index i must map to label i, so the keys have to be 0..n
        for (expected, (idx, _)) in indexed.iter().enumerate() {
            if *idx != expected {
                return Err(AppError::ModelLoad(format!(
                    "id2label is not contiguous: expected class index {}, found {}",
                    expected, idx
                )));
            }
        }
        indexed.into_iter().map(|(_, label)| label).collect()
    };

    if labels.is_empty() {
        return Err(AppError::ModelLoad("Label file defines no classes".to_string()));
    }
    Ok(labels)
}

impl Classifier for ModelService {
    fn predict(&self, image_path: &Path) -> Result<Classification, AppError> {
        let tensor = inference::preprocess_image(image_path, &self.preprocess)?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Inference("model session lock poisoned".to_string()))?;
        inference::run_inference_with_model(&mut session, tensor, &self.labels, self.output)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            ready: true,
            model_path: self.model_path.clone(),
            labels: self.labels.clone(),
            input_size: self.preprocess.input_size,
        }
    }
}
