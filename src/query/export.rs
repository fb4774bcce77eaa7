//! Delimited-text export of annotation lists

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TatError;
use crate::model::Annotation;

const HEADER: [&str; 9] = [
    "text",
    "tag",
    "canonical_name",
    "canonical_id",
    "status",
    "entity_p",
    "score_category",
    "start",
    "end",
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Csv,
    Tsv,
}

impl ExportFormat {
    pub fn delimiter(&self) -> char {
        match self {
            ExportFormat::Csv => ',',
            ExportFormat::Tsv => '\t',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tab-separated-values",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = TatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CSV" => Ok(ExportFormat::Csv),
            "TSV" => Ok(ExportFormat::Tsv),
            other => Err(TatError::invalid_input(format!("unsupported export format '{}'", other))),
        }
    }
}

fn push_field(out: &mut String, field: &str, delimiter: char) {
    let needs_quotes = field.contains(delimiter) || field.contains(&['"', '\n', '\r'][..]);
    if needs_quotes {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Render annotations with a header row, one line per annotation
pub fn export_annotations<'a>(annotations: impl IntoIterator<Item = &'a Annotation>, format: ExportFormat) -> String {
    let delimiter = format.delimiter();
    let mut out = String::new();

    let separator = delimiter.to_string();
    out.push_str(&HEADER.join(separator.as_str()));
    out.push('\n');

    for ann in annotations {
        let fields = [
            ann.text.clone(),
            ann.tag.clone(),
            ann.canonical_name.clone().unwrap_or_default(),
            ann.canonical_id.clone().unwrap_or_default(),
            ann.status.as_str().to_string(),
            ann.entity_p.to_string(),
            ann.score_category().as_str().to_string(),
            ann.start.to_string(),
            ann.end.to_string(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            push_field(&mut out, field, delimiter);
        }
        out.push('\n');
    }
    out
}

/// Download filename for a document export ("paper.pdf" -> "paper_annotations.csv")
pub fn export_filename(document_name: &str, format: ExportFormat) -> String {
    let stem = document_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(document_name);
    format!("{}_annotations.{}", stem, format.extension())
}
