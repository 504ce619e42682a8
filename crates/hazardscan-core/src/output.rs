//! Report sinks for CSV, JSON and JSONL output.
//!
//! CSV and JSONL rows are written as soon as they arrive, so a run that is
//! cancelled part-way still leaves every finished row on disk. JSON is a
//! single array and is written by [`OutputWriter::finish`].

use std::io::{self, Write};

use crate::error::Result;
use crate::types::ReportRow;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Single JSON array
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::JsonLines => "jsonl",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

enum Sink<W: Write> {
    Csv(csv::Writer<W>),
    Json {
        writer: W,
        rows: Vec<serde_json::Value>,
        pretty: bool,
    },
    JsonLines(W),
}

/// Streams report rows to a writer in the chosen format.
pub struct OutputWriter<W: Write> {
    sink: Sink<W>,
    diagnostics_column: bool,
    rows_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a writer. For CSV the header row is written immediately, so
    /// even an empty run produces a well-formed file.
    ///
    /// `diagnostics_column` adds the diagnostics column to CSV output; JSON
    /// formats always carry diagnostics for rows that have them.
    pub fn new(
        writer: W,
        format: OutputFormat,
        columns: &[String],
        diagnostics_column: bool,
        pretty: bool,
    ) -> Result<Self> {
        let sink = match format {
            OutputFormat::Csv => {
                let mut csv = csv::Writer::from_writer(writer);
                csv.write_record(columns)?;
                csv.flush()?;
                Sink::Csv(csv)
            }
            OutputFormat::Json => Sink::Json {
                writer,
                rows: Vec::new(),
                pretty,
            },
            OutputFormat::JsonLines => Sink::JsonLines(writer),
        };

        Ok(Self {
            sink,
            diagnostics_column,
            rows_written: 0,
        })
    }

    /// Write one row.
    pub fn write_row(&mut self, row: &ReportRow) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(csv) => {
                csv.write_record(row.cells(self.diagnostics_column))?;
                csv.flush()?;
            }
            Sink::Json { rows, .. } => {
                rows.push(serde_json::Value::Object(row.to_json_object()));
            }
            Sink::JsonLines(writer) => {
                // JSONL is never pretty-printed (one object per line)
                serde_json::to_writer(&mut *writer, &row.to_json_object())?;
                writeln!(writer)?;
                writer.flush()?;
            }
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Get the number of rows written.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Write any buffered output, flush, and return the underlying writer.
    pub fn finish(self) -> Result<W> {
        match self.sink {
            Sink::Csv(csv) => Ok(csv.into_inner().map_err(|e| e.into_error())?),
            Sink::Json {
                mut writer,
                rows,
                pretty,
            } => {
                if pretty {
                    serde_json::to_writer_pretty(&mut writer, &rows)?;
                } else {
                    serde_json::to_writer(&mut writer, &rows)?;
                }
                writeln!(writer)?;
                writer.flush()?;
                Ok(writer)
            }
            Sink::JsonLines(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

/// Open `path` for writing, creating parent directories as needed.
pub fn create_output_file(path: &std::path::Path) -> io::Result<io::BufWriter<std::fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(io::BufWriter::new(std::fs::File::create(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::report::{build_row, columns};
    use crate::taxonomy::Taxonomy;
    use crate::types::{DetectionRecord, ScoredTag, Stage, StageFailure};

    fn rows() -> Vec<ReportRow> {
        let taxonomy = Taxonomy::builtin();
        let den = DetectionRecord {
            file_name: "den.jpg".to_string(),
            tags: vec![
                ScoredTag::new("visible mold", 0.42),
                ScoredTag::new("kitty litter", 0.22),
            ],
            objects: vec!["cat".to_string(), "bed".to_string()],
            failures: vec![],
        };
        let broken = DetectionRecord::failed(
            "broken.jpg",
            StageFailure {
                stage: Stage::Decode,
                kind: FailureKind::DecodeFailure,
                message: "truncated".to_string(),
            },
        );
        vec![build_row(&den, &taxonomy), build_row(&broken, &taxonomy)]
    }

    fn render(format: OutputFormat, diagnostics: bool) -> String {
        let headers = columns(&Taxonomy::builtin(), diagnostics);
        let mut writer =
            OutputWriter::new(Vec::new(), format, &headers, diagnostics, false).unwrap();
        for row in rows() {
            writer.write_row(&row).unwrap();
        }
        assert_eq!(writer.rows_written(), 2);
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_csv_output() {
        let output = render(OutputFormat::Csv, false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Image,Xenoestrogens,Mold Triggers,Pet Hazards,Carcinogens,Safe Items,YOLO Objects"
        );
        assert_eq!(
            lines[1],
            "den.jpg,,\"visible mold, kitty litter\",kitty litter,,,\"cat, bed\""
        );
        assert_eq!(lines[2], "broken.jpg,,,,,,");
    }

    #[test]
    fn test_csv_diagnostics_column() {
        let output = render(OutputFormat::Csv, true);
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].ends_with(",YOLO Objects,Diagnostics"));
        assert!(lines[2].ends_with(",decode decode failure: truncated"));
    }

    #[test]
    fn test_csv_header_written_for_empty_run() {
        let headers = columns(&Taxonomy::builtin(), false);
        let writer = OutputWriter::new(Vec::new(), OutputFormat::Csv, &headers, false, false)
            .unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(output.lines().count(), 1);
    }

    #[test]
    fn test_json_array() {
        let output = render(OutputFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Mold Triggers"], "visible mold, kitty litter");
        assert!(rows[0].get("Diagnostics").is_none());
        assert_eq!(rows[1]["Diagnostics"][0], "decode decode failure: truncated");
    }

    #[test]
    fn test_jsonl_lines() {
        let output = render(OutputFormat::JsonLines, false);
        let lines: Vec<&str> = output.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["YOLO Objects"], "cat, bed");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("csv"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("JSONL"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("xlsx"), None);
    }

    #[test]
    fn test_create_output_file_makes_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("out.csv");
        let mut file = create_output_file(&path).unwrap();
        file.write_all(b"x").unwrap();
        drop(file);
        assert!(path.exists());
    }
}
