//! Line-delimited JSON reader
//!
//! Blank and `#` comment lines are skipped. A line that fails to parse is
//! logged with its line number and skipped; reading continues.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use contracts::ContractError;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, instrument};

/// Per-file reading statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Physical lines read
    pub lines: usize,
    /// Records accepted
    pub records: usize,
    /// Blank or comment lines
    pub skipped: usize,
    /// Lines that failed to parse or convert
    pub malformed: usize,
}

impl ReadStats {
    /// Accumulate another file's statistics
    pub fn merge(&mut self, other: &ReadStats) {
        self.lines += other.lines;
        self.records += other.records;
        self.skipped += other.skipped;
        self.malformed += other.malformed;
    }
}

/// One parsed line
#[derive(Debug, Clone, PartialEq)]
pub struct JsonLine {
    /// 1-based line number
    pub line: usize,
    pub value: Value,
}

/// Read every JSON value of a line-delimited file.
///
/// # Errors
/// - `MissingFile` when the path does not exist
/// - `Io` on read failure
#[instrument(name = "ingestion_read_jsonl", skip_all, fields(path = %path.display()))]
pub fn read_jsonl(path: &Path) -> Result<(Vec<JsonLine>, ReadStats), ContractError> {
    if !path.exists() {
        return Err(ContractError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let source_name = path.display().to_string();
    let mut reader = BufReader::new(File::open(path)?);
    let mut stats = ReadStats::default();
    let mut values = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        stats.lines += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                report_malformed(&ContractError::malformed_record(
                    &source_name,
                    line_no,
                    format!("invalid UTF-8: {e}"),
                ));
                stats.malformed += 1;
                continue;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            debug!(line = line_no, "skipping empty or comment line");
            stats.skipped += 1;
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                values.push(JsonLine {
                    line: line_no,
                    value,
                });
            }
            Err(e) => {
                report_malformed(&ContractError::malformed_record(
                    &source_name,
                    line_no,
                    e.to_string(),
                ));
                stats.malformed += 1;
            }
        }
    }

    stats.records = values.len();
    debug!(
        lines = stats.lines,
        records = stats.records,
        malformed = stats.malformed,
        "read line-delimited file"
    );
    Ok((values, stats))
}

/// Read a line-delimited file into typed records.
///
/// Lines whose JSON does not convert into `T` count as malformed and are
/// skipped like unparsable lines.
pub fn read_records<T: DeserializeOwned>(
    path: &Path,
) -> Result<(Vec<T>, ReadStats), ContractError> {
    let (lines, mut stats) = read_jsonl(path)?;
    let source_name = path.display().to_string();
    let mut records = Vec::with_capacity(lines.len());

    for JsonLine { line, value } in lines {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                let err = ContractError::malformed_record(&source_name, line, e.to_string());
                report_malformed(&err);
                stats.malformed += 1;
            }
        }
    }

    stats.records = records.len();
    Ok((records, stats))
}

pub(crate) fn report_malformed(err: &ContractError) {
    error!(error = %err, "skipping malformed record");
    counter!("timing_malformed_records_total").increment(1);
}
