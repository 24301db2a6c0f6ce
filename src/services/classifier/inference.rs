use crate::config::{ModelConfig, OutputKind};
use crate::error::AppError;
use crate::models::classify_types::{Classification, Prediction};
use crate::services::classifier::model_manager::OnnxSession;
use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use ort::value::Value;
use std::path::Path;

/// Resize, crop and normalization settings for the network input.
#[derive(Debug, Clone, Copy)]
pub struct Preprocess {
    pub input_size: u32,
    pub crop_pct: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl From<&ModelConfig> for Preprocess {
    fn from(config: &ModelConfig) -> Self {
        Self {
            input_size: config.input_size,
            crop_pct: config.crop_pct,
            mean: config.mean,
            std: config.std,
        }
    }
}

pub fn preprocess_image(path: &Path, params: &Preprocess) -> Result<Array4<f32>, AppError> {
    let img = ImageReader::open(path)
        .map_err(|e| AppError::Inference(format!("Failed to open image {}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| {
            AppError::Inference(format!("Failed to decode image {}: {}", path.display(), e))
        })?;
    preprocess_bitmap(&img, params)
}

pub fn preprocess_bitmap(img: &DynamicImage, params: &Preprocess) -> Result<Array4<f32>, AppError> {
    let crop_size = params.input_size;
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err(AppError::Inference(format!("Image has invalid dimensions {}x{}", w, h)));
    }

    // Resize shortest edge to ceil(crop_size / crop_pct), then center crop
    let resize_size = (crop_size as f32 / params.crop_pct).ceil() as u32;
    let (new_w, new_h) = if w < h {
        (resize_size, ((h as f32 / w as f32) * resize_size as f32).round() as u32)
    } else {
        (((w as f32 / h as f32) * resize_size as f32).round() as u32, resize_size)
    };
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let crop_x = (new_w.saturating_sub(crop_size)) / 2;
    let crop_y = (new_h.saturating_sub(crop_size)) / 2;
    let cropped = resized.crop_imm(crop_x, crop_y, crop_size, crop_size);
    let rgb = cropped.to_rgb8();
    if rgb.width() != crop_size || rgb.height() != crop_size {
        return Err(AppError::Inference(format!(
            "Cropped image is {}x{}, expected {}x{}",
            rgb.width(),
            rgb.height(),
            crop_size,
            crop_size
        )));
    }

    // HWC bytes -> planar CHW floats
    let hw = (crop_size * crop_size) as usize;
    let mut data = vec![0f32; 3 * hw];
    for (i, pixel) in rgb.as_raw().chunks_exact(3).enumerate() {
        for c in 0..3 {
            data[c * hw + i] = (pixel[c] as f32 / 255.0 - params.mean[c]) / params.std[c];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data)
        .map_err(|e| AppError::Inference(format!("Failed to create tensor: {}", e)))
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let exp_sum: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / exp_sum).collect()
}

/// Turns a raw output vector into a labelled distribution that sums to 1.
pub fn to_classification(
    output: &[f32],
    labels: &[String],
    kind: OutputKind,
) -> Result<Classification, AppError> {
    if output.is_empty() {
        return Err(AppError::Inference("Model produced an empty output tensor".into()));
    }
    if output.iter().any(|x| !x.is_finite()) {
        return Err(AppError::Inference("Model produced non-finite scores".into()));
    }

    let probabilities = match kind {
        OutputKind::Logits => softmax(output),
        OutputKind::Probabilities => {
            if output.iter().any(|&p| p < 0.0) {
                return Err(AppError::Inference(
                    "Model produced negative probabilities; is the output kind set to logits?"
                        .into(),
                ));
            }
            let total: f32 = output.iter().sum();
            if total <= 0.0 {
                return Err(AppError::Inference("Model probabilities sum to zero".into()));
            }
            output.iter().map(|p| p / total).collect()
        }
    };

    let predictions = probabilities
        .into_iter()
        .enumerate()
        .map(|(idx, confidence)| Prediction {
            class_name: labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx)),
            confidence,
        })
        .collect();

    Classification::from_predictions(predictions)
        .ok_or_else(|| AppError::Inference("Model produced an empty output tensor".into()))
}

pub fn run_inference_with_model(
    model: &mut OnnxSession,
    input: Array4<f32>,
    labels: &[String],
    kind: OutputKind,
) -> Result<Classification, AppError> {
    let input_name = model.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

    let outputs = model
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError::Inference(format!("Forward pass failed: {}", e)))?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

    let (_, data) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

    to_classification(data, labels, kind)
}
