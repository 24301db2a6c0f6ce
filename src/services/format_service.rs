use crate::config::VerdictConfig;
use crate::error::AppError;
use crate::models::classify_types::{Classification, ClassRow, ResultRow, Verdict};
use serde_json::json;

pub const CSV_HEADER: [&str; 3] = ["Image", "Predicted Class", "Confidence %"];
pub const CSV_FILE_NAME: &str = "predictions.csv";

/// Probability in [0,1] to a percentage rounded to 2 decimals.
pub fn to_percent(confidence: f32) -> f64 {
    (confidence as f64 * 10_000.0).round() / 100.0
}

/// All classes, highest confidence first. Ties keep model order.
pub fn class_table(classification: &Classification) -> Vec<ClassRow> {
    let mut rows: Vec<ClassRow> = classification
        .predictions
        .iter()
        .map(|p| ClassRow {
            class_name: p.class_name.clone(),
            confidence_percent: to_percent(p.confidence),
        })
        .collect();
    rows.sort_by(|a, b| b.confidence_percent.total_cmp(&a.confidence_percent));
    rows
}

pub fn format(classification: &Classification, verdicts: &VerdictConfig) -> (Vec<ClassRow>, Verdict) {
    let verdict = verdicts.verdict_for(&classification.top().class_name);
    (class_table(classification), verdict)
}

pub fn result_row(image_name: &str, classification: &Classification) -> ResultRow {
    let top = classification.top();
    ResultRow {
        image_name: image_name.to_string(),
        predicted_class: top.class_name.clone(),
        confidence_percent: to_percent(top.confidence),
    }
}

/// The unformatted distribution shown in the debug panel.
pub fn raw_output_json(classification: &Classification) -> serde_json::Value {
    let mut order: Vec<usize> = (0..classification.predictions.len()).collect();
    order.sort_by(|&a, &b| {
        classification.predictions[b]
            .confidence
            .total_cmp(&classification.predictions[a].confidence)
    });
    order.truncate(5);
    let top5conf: Vec<f32> = order
        .iter()
        .map(|&i| classification.predictions[i].confidence)
        .collect();

    let names: serde_json::Map<String, serde_json::Value> = classification
        .predictions
        .iter()
        .enumerate()
        .map(|(idx, p)| (idx.to_string(), json!(p.class_name)))
        .collect();

    json!({
        "top1": classification.top1,
        "top1conf": classification.top().confidence,
        "top5": order,
        "top5conf": top5conf,
        "data": classification
            .predictions
            .iter()
            .map(|p| p.confidence)
            .collect::<Vec<_>>(),
        "names": names,
    })
}

pub fn to_csv(rows: &[ResultRow]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        let confidence = format!("{:.2}", row.confidence_percent);
        writer.write_record([
            row.image_name.as_str(),
            row.predicted_class.as_str(),
            confidence.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| AppError::Io(std::io::Error::other(e)))
}

pub fn from_csv(data: &str) -> Result<Vec<ResultRow>, AppError> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.iter().ne(CSV_HEADER.iter().copied()) {
        return Err(AppError::Upload(format!("unexpected CSV header {:?}", headers)));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let confidence_percent = record[2]
            .parse::<f64>()
            .map_err(|e| AppError::Upload(format!("bad confidence {:?}: {}", &record[2], e)))?;
        rows.push(ResultRow {
            image_name: record[0].to_string(),
            predicted_class: record[1].to_string(),
            confidence_percent,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classify_types::Prediction;

    fn classification(probs: &[(&str, f32)]) -> Classification {
        Classification::from_predictions(
            probs
                .iter()
                .map(|(name, confidence)| Prediction {
                    class_name: name.to_string(),
                    confidence: *confidence,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn table_is_sorted_descending() {
        let c = classification(&[("a", 0.1), ("b", 0.6), ("c", 0.25), ("d", 0.05)]);
        let table = class_table(&c);
        let names: Vec<&str> = table.iter().map(|r| r.class_name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a", "d"]);
        assert!(table
            .windows(2)
            .all(|w| w[0].confidence_percent >= w[1].confidence_percent));
    }

    #[test]
    fn percentages_round_to_two_decimals() {
        assert_eq!(to_percent(0.123456), 12.35);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
    }

    #[test]
    fn verdict_follows_top_class_in_any_case() {
        let verdicts = VerdictConfig::default();
        for name in ["Feasible", "feasible", "FEASIBLE", "fEaSiBlE"] {
            let (_, verdict) = format(&classification(&[(name, 0.9), ("Infeasible", 0.1)]), &verdicts);
            assert_eq!(verdict, Verdict::Feasible, "{}", name);
        }
        for name in ["Infeasible", "Feasible-ish", "Unknown", ""] {
            let (_, verdict) = format(&classification(&[(name, 0.9), ("Feasible", 0.1)]), &verdicts);
            assert_eq!(verdict, Verdict::Infeasible, "{:?}", name);
        }
    }

    #[test]
    fn csv_has_header_and_rows_in_order() {
        let rows = vec![
            result_row("b.png", &classification(&[("Feasible", 0.91234), ("Infeasible", 0.08766)])),
            result_row("a, \"quoted\".jpg", &classification(&[("Feasible", 0.3), ("Infeasible", 0.7)])),
        ];
        let csv = to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Image,Predicted Class,Confidence %"));
        assert_eq!(lines.next(), Some("b.png,Feasible,91.23"));
        assert_eq!(lines.next(), Some("\"a, \"\"quoted\"\".jpg\",Infeasible,70.00"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_round_trip_reproduces_rows() {
        let rows = vec![
            result_row("one.png", &classification(&[("Feasible", 0.55555), ("Infeasible", 0.44445)])),
            result_row("two.jpeg", &classification(&[("Feasible", 0.01), ("Infeasible", 0.99)])),
        ];
        let parsed = from_csv(&to_csv(&rows).unwrap()).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn from_csv_rejects_foreign_header() {
        assert!(from_csv("a,b,c\n1,2,3\n").is_err());
    }

    #[test]
    fn raw_output_lists_distribution_and_names() {
        let c = classification(&[("Feasible", 0.2), ("Infeasible", 0.8)]);
        let raw = raw_output_json(&c);
        assert_eq!(raw["top1"], 1);
        assert_eq!(raw["top5"], json!([1, 0]));
        assert_eq!(raw["names"]["0"], "Feasible");
        assert_eq!(raw["data"].as_array().unwrap().len(), 2);
    }
}
