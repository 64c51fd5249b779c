//! Server-rendered web UI.
//!
//! The page is a static template (`static/index.html`) with four slots filled
//! per request: the form widgets, the result panel, the dataset preview and
//! the footer. Widgets come from [`FIELDS`]; flag selectors take their
//! options from the active [`InputEncoding`].

use std::fmt::Write;

use crate::dataset::TrainingDataset;
use crate::encoding::{FieldKind, InputEncoding, FIELDS};
use crate::patient::PatientRecord;
use crate::presentation::RiskAssessment;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Rows shown in the "Show Dataset" expander.
pub const DATASET_PREVIEW_ROWS: usize = 100;

/// What to show below the form.
#[derive(Debug, Clone)]
pub enum ResultView {
    Assessment(RiskAssessment),
    Error(String),
}

pub struct PageView<'a> {
    pub encoding: &'a dyn InputEncoding,
    /// Values the widgets are pre-set to.
    pub record: PatientRecord,
    pub result: ResultView,
    pub dataset: Option<&'a TrainingDataset>,
}

pub fn render_page(page: &PageView<'_>) -> String {
    INDEX_HTML
        .replace("{{FIELDS}}", &render_fields(page.encoding, &page.record))
        .replace("{{RESULT}}", &render_result(&page.result))
        .replace(
            "{{DATASET}}",
            &page.dataset.map(render_dataset).unwrap_or_default(),
        )
        .replace("{{VERSION}}", env!("CARGO_PKG_VERSION"))
        .replace("{{ENCODING}}", page.encoding.name())
}

fn render_fields(encoding: &dyn InputEncoding, record: &PatientRecord) -> String {
    let values = encoding.form_values(record);
    let mut out = String::new();

    for (field, (_, value)) in FIELDS.iter().zip(values) {
        let _ = write!(
            out,
            "<div class=\"field\"><label for=\"{name}\">{label}</label>",
            name = field.name,
            label = escape(field.label),
        );
        match field.kind {
            FieldKind::Integer { min, max, .. } => {
                let _ = write!(
                    out,
                    "{}",
                    slider(field.name, &min.to_string(), &max.to_string(), "1", &value)
                );
            }
            FieldKind::Float { min, max, step, .. } => {
                let _ = write!(
                    out,
                    "{}",
                    slider(
                        field.name,
                        &min.to_string(),
                        &max.to_string(),
                        &step.to_string(),
                        &value
                    )
                );
            }
            FieldKind::Flag { on, off, .. } => {
                let _ = write!(out, "<select id=\"{0}\" name=\"{0}\">", field.name);
                for (submitted, text) in encoding.flag_options(on, off) {
                    let selected = if submitted == value { " selected" } else { "" };
                    let _ = write!(
                        out,
                        "<option value=\"{}\"{selected}>{}</option>",
                        escape(&submitted),
                        escape(&text)
                    );
                }
                out.push_str("</select>");
            }
        }
        out.push_str("</div>\n");
    }
    out
}

fn slider(name: &str, min: &str, max: &str, step: &str, value: &str) -> String {
    format!(
        "<input type=\"range\" id=\"{name}\" name=\"{name}\" min=\"{min}\" max=\"{max}\" \
         step=\"{step}\" value=\"{value}\" oninput=\"this.nextElementSibling.value=this.value\">\
         <output>{value}</output>",
        value = escape(value),
    )
}

fn render_result(result: &ResultView) -> String {
    match result {
        ResultView::Assessment(a) => format!(
            "<section class=\"panel {class}\" data-label=\"{label}\">\
             <h2>{headline}</h2>\
             <p class=\"confidence\">Confidence: <strong>{confidence}</strong></p>\
             <p>{advisory}</p></section>",
            class = a.severity.panel_class(),
            label = a.label.index(),
            headline = escape(&a.headline),
            confidence = escape(&a.confidence_text),
            advisory = escape(&a.advisory),
        ),
        ResultView::Error(msg) => format!(
            "<section class=\"panel error\"><h2>Prediction unavailable</h2><p>{}</p></section>",
            escape(msg)
        ),
    }
}

fn render_dataset(dataset: &TrainingDataset) -> String {
    let mut out = String::from("<details><summary>Show Dataset</summary>");
    let _ = write!(
        out,
        "<p>{} rows · {} columns · {}</p><table><thead><tr>",
        dataset.len(),
        dataset.n_columns(),
        escape(dataset.fingerprint())
    );
    for column in dataset.column_names() {
        let _ = write!(out, "<th>{column}</th>");
    }
    out.push_str("</tr></thead><tbody>");

    for (record, target) in dataset.rows().take(DATASET_PREVIEW_ROWS) {
        out.push_str("<tr>");
        for value in record.to_features() {
            let _ = write!(out, "<td>{value}</td>");
        }
        let _ = write!(out, "<td>{target}</td></tr>");
    }
    out.push_str("</tbody></table>");
    if dataset.len() > DATASET_PREVIEW_ROWS {
        let _ = write!(
            out,
            "<p>Showing the first {DATASET_PREVIEW_ROWS} of {} rows.</p>",
            dataset.len()
        );
    }
    out.push_str("</details>");
    out
}

/// Minimal HTML text/attribute escaping.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
