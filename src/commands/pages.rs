//! Server-rendered HTML for the upload forms and result views.

use crate::models::classify_types::{BatchItem, BatchReport, ClassRow, SingleReport, Verdict};
use crate::services::format_service::CSV_FILE_NAME;
use base64::Engine;
use html_escape::encode_safe;
use std::fmt::Write;

const TITLE: &str = "Bus Route Feasibility Predictor";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; color: #222; }
nav a { margin-right: 1rem; }
.caption { color: #666; }
form { margin: 1.5rem 0; padding: 1rem; border: 1px dashed #aaa; border-radius: 8px; }
img.upload { max-width: 100%; border-radius: 6px; display: block; margin: 0.5rem 0; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #ddd; }
.banner { padding: 0.8rem 1rem; border-radius: 6px; margin: 1rem 0; }
.success { background: #e6f4ea; color: #1e6b34; }
.error { background: #fdecea; color: #8a1c1c; }
details pre { background: #f5f5f5; padding: 0.8rem; overflow-x: auto; }
.item { margin: 1rem 0; }
"#;

fn layout(caption: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<nav><a href="/">Single image</a><a href="/batch">Batch</a></nav>
<h1>&#x1F68C; {title}</h1>
<p class="caption">{caption}</p>
{body}
</body>
</html>
"#,
        title = TITLE,
        style = STYLE,
        caption = encode_safe(caption),
        body = body,
    )
}

fn banner(verdict: Verdict) -> String {
    let class = if verdict.is_positive() { "success" } else { "error" };
    format!(
        r#"<div class="banner {}">Verdict: This route is {}!</div>"#,
        class,
        verdict.as_str()
    )
}

fn error_banner(message: &str) -> String {
    format!(r#"<div class="banner error">{}</div>"#, encode_safe(message))
}

fn thumbnail(src: &str, alt: &str) -> String {
    if src.is_empty() {
        return String::new();
    }
    format!(r#"<img class="upload" src="{}" alt="{}">"#, src, encode_safe(alt))
}

fn class_table(rows: &[ClassRow]) -> String {
    let mut html = String::from("<table><thead><tr><th>Class</th><th>Confidence %</th></tr></thead><tbody>");
    for row in rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{:.2}</td></tr>",
            encode_safe(&row.class_name),
            row.confidence_percent
        );
    }
    html.push_str("</tbody></table>");
    html
}

pub fn single_page(report: Option<&SingleReport>, error: Option<&str>) -> String {
    let mut body = String::from(
        r#"<form method="post" action="/" enctype="multipart/form-data">
<label>Upload Route Image <input type="file" name="file" accept=".png,.jpg,.jpeg" required></label>
<button type="submit">Predict</button>
</form>"#,
    );

    if let Some(message) = error {
        body.push_str(&error_banner(message));
    }

    if let Some(report) = report {
        body.push_str(&thumbnail(&report.thumbnail, "Uploaded Image"));
        body.push_str("<h2>Prediction Results</h2>");
        let _ = write!(
            body,
            "<h3>Predicted Class: <code>{}</code></h3>",
            encode_safe(&report.predicted_class)
        );
        body.push_str(&class_table(&report.table));
        body.push_str(&banner(report.verdict));

        let raw = serde_json::to_string_pretty(&report.raw_output).unwrap_or_default();
        let _ = write!(
            body,
            "<details><summary>&#x1F50D; Raw Model Output (For Debugging)</summary><pre>{}</pre></details>",
            encode_safe(&raw)
        );
    }

    layout(
        "Upload a route image to check if it's Feasible or Infeasible.",
        &body,
    )
}

pub fn batch_page(report: Option<&BatchReport>, error: Option<&str>, max_batch_size: usize) -> String {
    let mut body = format!(
        r#"<form method="post" action="/batch" enctype="multipart/form-data">
<label>Upload Route Images (up to {max}) <input type="file" name="files" accept=".png,.jpg,.jpeg" multiple required></label>
<button type="submit">Predict</button>
</form>"#,
        max = max_batch_size
    );

    if let Some(message) = error {
        body.push_str(&error_banner(message));
    }

    if let Some(report) = report {
        body.push_str("<h2>Prediction Results</h2>");
        for item in &report.items {
            body.push_str(r#"<div class="item">"#);
            match item {
                BatchItem::Classified {
                    image_name,
                    thumbnail: src,
                    predicted_class,
                    confidence_percent,
                    verdict,
                    breakdown,
                } => {
                    body.push_str(&thumbnail(src, image_name));
                    let class = if verdict.is_positive() { "success" } else { "error" };
                    let _ = write!(
                        body,
                        r#"<div class="banner {}"><strong>{}</strong> &rarr; {} ({:.2}%)</div>"#,
                        class,
                        encode_safe(image_name),
                        encode_safe(predicted_class),
                        confidence_percent
                    );
                    body.push_str(&class_table(breakdown));
                }
                BatchItem::Failed {
                    image_name,
                    message,
                    ..
                } => {
                    let _ = write!(
                        body,
                        r#"<div class="banner error"><strong>{}</strong>: {}</div>"#,
                        encode_safe(image_name),
                        encode_safe(message)
                    );
                }
            }
            body.push_str("</div>");
        }

        body.push_str("<h2>Summary</h2>");
        body.push_str(
            "<table><thead><tr><th>Image</th><th>Predicted Class</th><th>Confidence %</th></tr></thead><tbody>",
        );
        for row in &report.rows {
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>",
                encode_safe(&row.image_name),
                encode_safe(&row.predicted_class),
                row.confidence_percent
            );
        }
        body.push_str("</tbody></table>");

        if !report.rows.is_empty() {
            let payload = base64::engine::general_purpose::STANDARD.encode(report.csv.as_bytes());
            let _ = write!(
                body,
                r#"<p><a download="{name}" href="data:text/csv;charset=utf-8;base64,{payload}">&#x2B07; Download CSV</a></p>"#,
                name = CSV_FILE_NAME,
                payload = payload
            );
        }
    }

    layout("Upload up to 10 route images to check which are Feasible.", &body)
}
