use crate::config::{AppConfig, VerdictConfig};
use crate::error::AppError;
use crate::models::classify_types::{BatchItem, BatchReport, Classification, SingleReport};
use crate::models::upload_types::UploadedImage;
use crate::services::classifier::Classifier;
use crate::services::{format_service, ingest_service, thumbnail_service};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Ingest -> infer -> format for one request. Blocking; run it off the
/// async reactor.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    verdicts: VerdictConfig,
    max_batch_size: usize,
    temp_dir: Option<PathBuf>,
}

struct Processed {
    classification: Classification,
    thumbnail: String,
}

impl Pipeline {
    pub fn new(classifier: Arc<dyn Classifier>, config: &AppConfig) -> Self {
        Self {
            classifier,
            verdicts: config.verdicts.clone(),
            max_batch_size: config.server.max_batch_size,
            temp_dir: config.temp_dir.clone(),
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn process(&self, upload: &UploadedImage) -> Result<Processed, AppError> {
        let start = Instant::now();
        let ingested = ingest_service::ingest(upload, self.temp_dir.as_deref())?;
        let classification = self.classifier.predict(ingested.path())?;

        let thumbnail =
            thumbnail_service::generate_thumbnail(&upload.bytes, &ingested.bitmap, ingested.format)
                .unwrap_or_else(|e| {
                    warn!(file = %upload.file_name, error = %e, "thumbnail failed");
                    String::new()
                });

        let top = classification.top();
        info!(
            file = %upload.file_name,
            class = %top.class_name,
            confidence = top.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image classified"
        );
        Ok(Processed {
            classification,
            thumbnail,
        })
    }

    pub fn classify_single(&self, upload: &UploadedImage) -> Result<SingleReport, AppError> {
        let processed = self.process(upload).inspect_err(|e| {
            warn!(file = %upload.file_name, error = %e, "classification failed");
        })?;
        let classification = &processed.classification;
        let (table, verdict) = format_service::format(classification, &self.verdicts);
        let top = classification.top();

        Ok(SingleReport {
            image_name: upload.file_name.clone(),
            thumbnail: processed.thumbnail,
            predicted_class: top.class_name.clone(),
            confidence_percent: format_service::to_percent(top.confidence),
            verdict,
            table,
            raw_output: format_service::raw_output_json(classification),
        })
    }

    /// Processes uploads one at a time in upload order. The whole batch is
    /// rejected up front when it is over the limit; otherwise a failing image
    /// is reported and the rest still run.
    pub fn classify_batch(&self, uploads: &[UploadedImage]) -> Result<BatchReport, AppError> {
        ingest_service::check_batch_size(uploads.len(), self.max_batch_size).inspect_err(|e| {
            warn!(error = %e, "batch rejected");
        })?;

        let mut items = Vec::with_capacity(uploads.len());
        let mut rows = Vec::with_capacity(uploads.len());

        for upload in uploads {
            match self.process(upload) {
                Ok(processed) => {
                    let classification = &processed.classification;
                    let (breakdown, verdict) = format_service::format(classification, &self.verdicts);
                    let row = format_service::result_row(&upload.file_name, classification);
                    items.push(BatchItem::Classified {
                        image_name: row.image_name.clone(),
                        thumbnail: processed.thumbnail,
                        predicted_class: row.predicted_class.clone(),
                        confidence_percent: row.confidence_percent,
                        verdict,
                        breakdown,
                    });
                    rows.push(row);
                }
                Err(e) => {
                    warn!(file = %upload.file_name, error = %e, "skipping image in batch");
                    items.push(BatchItem::Failed {
                        image_name: upload.file_name.clone(),
                        error: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let csv = format_service::to_csv(&rows)?;
        info!(
            uploaded = uploads.len(),
            classified = rows.len(),
            "batch complete"
        );
        Ok(BatchReport { items, rows, csv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classify_types::{ModelStatus, Prediction, Verdict};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    /// Reads the red channel of the first pixel to decide the class, so tests
    /// can steer the outcome through the uploaded image itself. An image whose
    /// red channel equals `fail_on_red` makes the forward pass fail.
    #[derive(Default)]
    struct StubClassifier {
        seen: Mutex<Vec<PathBuf>>,
        fail_on_red: Option<u8>,
    }

    impl Classifier for StubClassifier {
        fn predict(&self, image_path: &Path) -> Result<Classification, AppError> {
            self.seen.lock().unwrap().push(image_path.to_path_buf());
            assert!(image_path.exists());
            let img = image::open(image_path)?.to_rgb8();
            let red = img.get_pixel(0, 0)[0];
            if self.fail_on_red == Some(red) {
                return Err(AppError::Inference("backend exploded".into()));
            }
            let feasible = red as f32 / 255.0;
            Ok(Classification::from_predictions(vec![
                Prediction {
                    class_name: "Feasible".into(),
                    confidence: feasible,
                },
                Prediction {
                    class_name: "Infeasible".into(),
                    confidence: 1.0 - feasible,
                },
            ])
            .unwrap())
        }

        fn status(&self) -> ModelStatus {
            ModelStatus {
                ready: true,
                model_path: PathBuf::from("stub.onnx"),
                labels: vec!["Feasible".into(), "Infeasible".into()],
                input_size: 224,
            }
        }
    }

    fn png(red: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([red, 0, 0])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn pipeline(stub: Arc<StubClassifier>, dir: &Path) -> Pipeline {
        let config = AppConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..AppConfig::default()
        };
        Pipeline::new(stub, &config)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn single_image_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let report = pipeline(stub, dir.path())
            .classify_single(&UploadedImage::new("route.png", png(230)))
            .unwrap();

        assert_eq!(report.predicted_class, "Feasible");
        assert_eq!(report.verdict, Verdict::Feasible);
        assert_eq!(report.table.len(), 2);
        assert_eq!(report.table[0].class_name, "Feasible");
        assert!(report.thumbnail.starts_with("data:image/jpeg;base64,"));
        assert_eq!(report.raw_output["top1"], 0);
    }

    #[test]
    fn single_image_infeasible_verdict() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let report = pipeline(stub, dir.path())
            .classify_single(&UploadedImage::new("route.png", png(20)))
            .unwrap();
        assert_eq!(report.predicted_class, "Infeasible");
        assert_eq!(report.verdict, Verdict::Infeasible);
    }

    #[test]
    fn temp_files_are_gone_after_success_and_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        pipeline(stub.clone(), dir.path())
            .classify_single(&UploadedImage::new("ok.png", png(200)))
            .unwrap();
        assert!(dir_is_empty(dir.path()));

        let failing = Arc::new(StubClassifier {
            fail_on_red: Some(200),
            ..StubClassifier::default()
        });
        let err = pipeline(failing.clone(), dir.path())
            .classify_single(&UploadedImage::new("bad.png", png(200)))
            .unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
        let seen = failing.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn eleven_images_are_rejected_before_processing() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let uploads: Vec<UploadedImage> = (0..11)
            .map(|i| UploadedImage::new(format!("{}.png", i), png(200)))
            .collect();

        let err = pipeline(stub.clone(), dir.path())
            .classify_batch(&uploads)
            .unwrap_err();
        assert!(matches!(err, AppError::BatchSizeExceeded { count: 11, max: 10 }));
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn ten_images_yield_ten_rows_in_upload_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let uploads: Vec<UploadedImage> = (0..10)
            .map(|i| UploadedImage::new(format!("route-{}.png", 9 - i), png(i as u8 * 25)))
            .collect();

        let report = pipeline(stub.clone(), dir.path())
            .classify_batch(&uploads)
            .unwrap();

        assert_eq!(report.rows.len(), 10);
        assert_eq!(report.items.len(), 10);
        let names: Vec<&str> = report.rows.iter().map(|r| r.image_name.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("route-{}.png", 9 - i)).collect();
        assert_eq!(names, expected);
        assert_eq!(stub.seen.lock().unwrap().len(), 10);
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn csv_matches_summary_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let uploads = vec![
            UploadedImage::new("a.png", png(255)),
            UploadedImage::new("b.png", png(51)),
        ];
        let report = pipeline(stub, dir.path()).classify_batch(&uploads).unwrap();
        let parsed = format_service::from_csv(&report.csv).unwrap();
        assert_eq!(parsed, report.rows);
        assert_eq!(parsed[0].predicted_class, "Feasible");
        assert_eq!(parsed[1].predicted_class, "Infeasible");
        assert_eq!(parsed[1].confidence_percent, 80.0);
    }

    #[test]
    fn failing_images_are_reported_and_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier::default());
        let uploads = vec![
            UploadedImage::new("good.png", png(255)),
            UploadedImage::new("broken.png", b"garbage".to_vec()),
            UploadedImage::new("route.gif", png(255)),
            UploadedImage::new("also-good.jpg", png(0)),
        ];
        let report = pipeline(stub.clone(), dir.path())
            .classify_batch(&uploads)
            .unwrap();

        assert_eq!(report.items.len(), 4);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].image_name, "also-good.jpg");
        match &report.items[1] {
            BatchItem::Failed { error, .. } => assert_eq!(error, "decode"),
            other => panic!("expected failure, got {:?}", other),
        }
        match &report.items[2] {
            BatchItem::Failed { error, .. } => assert_eq!(error, "unsupported_format"),
            other => panic!("expected failure, got {:?}", other),
        }
        // Rejected uploads never reach the model.
        assert_eq!(stub.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn inference_failure_on_one_image_does_not_stop_the_batch() {
        let dir = tempfile::TempDir::new().unwrap();
        let stub = Arc::new(StubClassifier {
            fail_on_red: Some(77),
            ..StubClassifier::default()
        });
        let uploads = vec![
            UploadedImage::new("first.png", png(255)),
            UploadedImage::new("middle.png", png(77)),
            UploadedImage::new("last.png", png(0)),
        ];
        let report = pipeline(stub.clone(), dir.path())
            .classify_batch(&uploads)
            .unwrap();

        assert_eq!(report.items.len(), 3);
        match &report.items[1] {
            BatchItem::Failed { image_name, error, .. } => {
                assert_eq!(image_name, "middle.png");
                assert_eq!(error, "inference");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(matches!(report.items[0], BatchItem::Classified { .. }));
        assert!(matches!(report.items[2], BatchItem::Classified { .. }));

        let names: Vec<&str> = report.rows.iter().map(|r| r.image_name.as_str()).collect();
        assert_eq!(names, vec!["first.png", "last.png"]);
        assert_eq!(report.rows[0].predicted_class, "Feasible");
        assert_eq!(report.rows[1].predicted_class, "Infeasible");
        assert!(!report.csv.contains("middle.png"));

        // All three reached the model, and none left a temp file behind.
        assert_eq!(stub.seen.lock().unwrap().len(), 3);
        assert!(dir_is_empty(dir.path()));
    }
}
