//! Terminal and machine-readable rendering of pipeline output.

use owo_colors::OwoColorize;
use tabled::settings::{object::Rows, Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::models::{AnalysisResult, BatchOutcome, FieldStatus, PaperRecord};

/// Whether colored output goes to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Enabled,
    Disabled,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "PMID")]
    pmid: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn status_label(status: FieldStatus) -> &'static str {
    match status {
        FieldStatus::Present => "PRESENT",
        FieldStatus::PartiallyPresent => "PARTIALLY_PRESENT",
        FieldStatus::Absent => "ABSENT",
    }
}

fn styled(table: &mut Table) -> &mut Table {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
}

/// Render paper metadata as a key/value table.
pub fn render_record(record: &PaperRecord, color: ColorMode) -> String {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["Field", "Value"]);
    builder.push_record(["PMID", record.pmid.as_str()]);
    builder.push_record(["Title", &record.title]);
    builder.push_record(["Authors", &record.authors.join(", ")]);
    builder.push_record(["Journal", &record.journal]);
    builder.push_record(["Published", &record.publication_date]);
    builder.push_record([
        "Full text",
        if record.has_full_text { "yes (PMC)" } else { "no" },
    ]);

    let mut table = builder.build();
    let mut out = styled(&mut table).to_string();

    if !record.r#abstract.is_empty() {
        let heading = match color {
            ColorMode::Enabled => "Abstract".bold().to_string(),
            ColorMode::Disabled => "Abstract".to_string(),
        };
        out.push_str(&format!("\n\n{}\n{}\n", heading, record.r#abstract));
    }
    out
}

/// Render one analysis as a per-field table followed by the readiness summary.
pub fn render_analysis(analysis: &AnalysisResult, color: ColorMode) -> String {
    let rows: Vec<FieldRow> = analysis
        .fields
        .iter()
        .map(|(field, result)| FieldRow {
            field: field.key().to_string(),
            status: status_label(result.status).to_string(),
            value: result
                .value
                .clone()
                .or_else(|| result.reason.clone())
                .unwrap_or_default(),
            confidence: if result.status == FieldStatus::Absent {
                "-".to_string()
            } else {
                format!("{:.2}", result.confidence)
            },
        })
        .collect();

    let mut table = Table::new(rows);
    styled(&mut table);

    let summary = match (color, analysis.missing_fields().is_empty()) {
        (ColorMode::Enabled, true) => analysis.curation_summary.green().to_string(),
        (ColorMode::Enabled, false) => analysis.curation_summary.yellow().to_string(),
        (ColorMode::Disabled, _) => analysis.curation_summary.clone(),
    };

    format!(
        "{} ({})\n{}\n\n{}\n\nProcessed in {} ms",
        analysis.record.title,
        analysis.record.pmid,
        table,
        summary,
        analysis.processing_ms
    )
}

/// Render a batch outcome as one row per input slot plus totals.
pub fn render_batch(outcome: &BatchOutcome, color: ColorMode) -> String {
    let rows: Vec<BatchRow> = outcome
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| BatchRow {
            position: i + 1,
            pmid: item.pmid.clone(),
            result: if item.is_ok() { "ok" } else { "failed" }.to_string(),
            detail: match (&item.analysis, &item.error) {
                (Some(analysis), _) => analysis.curation_summary.clone(),
                (None, Some(err)) => err.to_string(),
                (None, None) => String::new(),
            },
        })
        .collect();

    let mut table = Table::new(rows);
    styled(&mut table);

    let totals = format!(
        "{} succeeded, {} failed in {} ms",
        outcome.succeeded(),
        outcome.failed(),
        outcome.elapsed_ms
    );
    let totals = match (color, outcome.failed()) {
        (ColorMode::Enabled, 0) => totals.green().to_string(),
        (ColorMode::Enabled, _) => totals.yellow().to_string(),
        (ColorMode::Disabled, _) => totals,
    };

    format!("{table}\n\n{totals}")
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

const ANALYSIS_CSV_HEADER: &str = "pmid,field,status,value,confidence,reason";

fn analysis_csv_rows(analysis: &AnalysisResult, out: &mut String) {
    for (field, result) in &analysis.fields {
        out.push_str(&format!(
            "{},{},{},{},{:.2},{}\n",
            analysis.record.pmid,
            field.key(),
            status_label(result.status),
            csv_escape(result.value.as_deref().unwrap_or("")),
            result.confidence,
            csv_escape(result.reason.as_deref().unwrap_or("")),
        ));
    }
}

/// One CSV row per field.
pub fn analysis_csv(analysis: &AnalysisResult) -> String {
    let mut out = String::from(ANALYSIS_CSV_HEADER);
    out.push('\n');
    analysis_csv_rows(analysis, &mut out);
    out
}

/// One CSV row per field per successfully analyzed input slot; failed slots
/// get a single error row.
pub fn batch_csv(outcome: &BatchOutcome) -> String {
    let mut out = String::from(ANALYSIS_CSV_HEADER);
    out.push('\n');
    for item in &outcome.items {
        match (&item.analysis, &item.error) {
            (Some(analysis), _) => analysis_csv_rows(analysis, &mut out),
            (None, Some(err)) => {
                out.push_str(&format!(
                    "{},error,,,,{}\n",
                    csv_escape(&item.pmid),
                    csv_escape(&err.to_string())
                ));
            }
            (None, None) => {}
        }
    }
    out
}
