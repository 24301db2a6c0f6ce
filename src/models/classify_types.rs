use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub ready: bool,
    pub model_path: PathBuf,
    pub labels: Vec<String>,
    pub input_size: u32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

/// Full distribution for one image, in model label order.
#[derive(Debug, Serialize, Clone)]
pub struct Classification {
    pub predictions: Vec<Prediction>,
    pub top1: usize,
}

impl Classification {
    /// Builds a classification, picking the argmax as top-1.
    /// Returns `None` for an empty distribution.
    pub fn from_predictions(predictions: Vec<Prediction>) -> Option<Self> {
        let top1 = predictions
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
                Some((_, conf)) if conf >= p.confidence => best,
                _ => Some((idx, p.confidence)),
            })?
            .0;
        Some(Self { predictions, top1 })
    }

    pub fn top(&self) -> &Prediction {
        &self.predictions[self.top1]
    }

    pub fn total_confidence(&self) -> f32 {
        self.predictions.iter().map(|p| p.confidence).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Feasible,
    Infeasible,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Feasible => "Feasible",
            Verdict::Infeasible => "Infeasible",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Verdict::Feasible)
    }
}

/// One line of the per-class confidence table.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ClassRow {
    pub class_name: String,
    pub confidence_percent: f64,
}

/// One line of the batch summary; also the CSV record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResultRow {
    pub image_name: String,
    pub predicted_class: String,
    pub confidence_percent: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct SingleReport {
    pub image_name: String,
    #[serde(skip)]
    pub thumbnail: String,
    pub predicted_class: String,
    pub confidence_percent: f64,
    pub verdict: Verdict,
    pub table: Vec<ClassRow>,
    pub raw_output: serde_json::Value,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Classified {
        image_name: String,
        #[serde(skip)]
        thumbnail: String,
        predicted_class: String,
        confidence_percent: f64,
        verdict: Verdict,
        breakdown: Vec<ClassRow>,
    },
    Failed {
        image_name: String,
        error: String,
        message: String,
    },
}

impl BatchItem {
    pub fn image_name(&self) -> &str {
        match self {
            BatchItem::Classified { image_name, .. } | BatchItem::Failed { image_name, .. } => {
                image_name
            }
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub rows: Vec<ResultRow>,
    pub csv: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(name: &str, confidence: f32) -> Prediction {
        Prediction {
            class_name: name.to_string(),
            confidence,
        }
    }

    #[test]
    fn top1_is_the_argmax() {
        let c = Classification::from_predictions(vec![
            pred("Feasible", 0.2),
            pred("Infeasible", 0.7),
            pred("Unknown", 0.1),
        ])
        .unwrap();
        assert_eq!(c.top1, 1);
        assert_eq!(c.top().class_name, "Infeasible");
    }

    #[test]
    fn ties_keep_the_first_class() {
        let c = Classification::from_predictions(vec![pred("a", 0.5), pred("b", 0.5)]).unwrap();
        assert_eq!(c.top1, 0);
    }

    #[test]
    fn empty_distribution_has_no_classification() {
        assert!(Classification::from_predictions(Vec::new()).is_none());
    }
}
