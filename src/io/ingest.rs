//! Acquisition ingest.
//!
//! The sampler appends one line per parameter set:
//!
//! ```text
//! N, k, level, base_log, ggsw_bit, input_var, output_var, predicted_var
//! ```
//!
//! This module turns those lines into `MeasurementRecord`s. Bad lines are
//! reported and skipped; one broken line never invalidates the corpus.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::domain::MeasurementRecord;
use crate::error::{AppError, NoiseError};

/// Field separator used by the sampler.
pub const FIELD_SEPARATOR: &str = ", ";

/// Minimum number of fields on a usable line.
pub const MIN_FIELDS: usize = 8;

const PARAMETER_FIELDS: [usize; 4] = [0, 1, 2, 3];
const INPUT_VARIANCE_FIELD: usize = 5;
const OUTPUT_VARIANCE_FIELD: usize = 6;
const PREDICTED_VARIANCE_FIELD: usize = 7;

/// Parsed corpus: records plus the lines that were rejected.
#[derive(Debug, Clone, Default)]
pub struct ParsedCorpus {
    pub records: Vec<MeasurementRecord>,
    pub row_errors: Vec<NoiseError>,
    pub lines_read: usize,
}

/// Parse one acquisition line. `line_no` is 1-based and only used for errors.
pub fn parse_line(line: &str, line_no: usize) -> Result<MeasurementRecord, NoiseError> {
    let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FIELDS {
        return Err(NoiseError::MalformedRecord {
            line: line_no,
            field: fields.len(),
            reason: format!("expected at least {MIN_FIELDS} fields, found {}", fields.len()),
        });
    }

    let mut structural_parameters = [0.0; 4];
    for (slot, &idx) in structural_parameters.iter_mut().zip(PARAMETER_FIELDS.iter()) {
        *slot = parse_field(&fields, idx, line_no)?;
    }

    Ok(MeasurementRecord {
        structural_parameters,
        input_variance: parse_field(&fields, INPUT_VARIANCE_FIELD, line_no)?,
        observed_output_variance: parse_field(&fields, OUTPUT_VARIANCE_FIELD, line_no)?,
        theoretical_output_variance: parse_field(&fields, PREDICTED_VARIANCE_FIELD, line_no)?,
    })
}

fn parse_field(fields: &[&str], idx: usize, line_no: usize) -> Result<f64, NoiseError> {
    let raw = fields[idx].trim();
    let value = raw.parse::<f64>().map_err(|e| NoiseError::MalformedRecord {
        line: line_no,
        field: idx,
        reason: format!("'{raw}' is not a number ({e})"),
    })?;
    if !value.is_finite() {
        return Err(NoiseError::MalformedRecord {
            line: line_no,
            field: idx,
            reason: format!("'{raw}' is not finite"),
        });
    }
    Ok(value)
}

/// Parse every line from a reader, logging and skipping malformed ones.
pub fn parse_corpus<R: Read>(reader: R) -> Result<ParsedCorpus, AppError> {
    let mut corpus = ParsedCorpus::default();

    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| AppError::new(2, format!("Failed to read line {line_no}: {e}")))?;
        corpus.lines_read += 1;

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line, line_no) {
            Ok(record) => corpus.records.push(record),
            Err(err) => {
                log::warn!("Skipping line: {err} (line: {:?})", line.trim());
                corpus.row_errors.push(err);
            }
        }
    }

    log::info!(
        "Parsed {} record(s) from {} line(s), {} rejected",
        corpus.records.len(),
        corpus.lines_read,
        corpus.row_errors.len()
    );

    Ok(corpus)
}

/// Open and parse a corpus file.
pub fn load_corpus(path: &Path) -> Result<ParsedCorpus, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open corpus '{}': {e}", path.display())))?;
    parse_corpus(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "1024, 2, 3, 7, 1, 1.2e-14, 3.5e-10, 2.1e-10";

    #[test]
    fn parses_well_formed_line() {
        let rec = parse_line(GOOD, 1).unwrap();
        assert_eq!(rec.structural_parameters, [1024.0, 2.0, 3.0, 7.0]);
        assert_eq!(rec.input_variance, 1.2e-14);
        assert_eq!(rec.observed_output_variance, 3.5e-10);
        assert_eq!(rec.theoretical_output_variance, 2.1e-10);
    }

    #[test]
    fn ignores_field_four_and_trailing_fields() {
        let rec = parse_line("512, 1, 2, 4, not-a-bit, 1e-12, 2e-9, 1e-9, 42, extra\n", 1).unwrap();
        assert_eq!(rec.structural_parameters, [512.0, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn rejects_short_line() {
        let err = parse_line("1024, 2, 3, 7, 1, 1e-14, 3e-10", 4).unwrap_err();
        assert!(matches!(err, NoiseError::MalformedRecord { line: 4, .. }));
    }

    #[test]
    fn rejects_non_numeric_used_fields() {
        for idx in [0usize, 1, 2, 3, 5, 6, 7] {
            let mut fields: Vec<String> = GOOD.split(", ").map(str::to_string).collect();
            fields[idx] = "oops".to_string();
            let line = fields.join(", ");
            match parse_line(&line, 9) {
                Err(NoiseError::MalformedRecord { field, .. }) => assert_eq!(field, idx),
                other => panic!("field {idx}: expected MalformedRecord, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = parse_line("1024, 2, 3, 7, 1, NaN, 3e-10, 2e-10", 1).unwrap_err();
        assert!(matches!(err, NoiseError::MalformedRecord { field: 5, .. }));
        let err = parse_line("1024, 2, 3, 7, 1, 1e-14, inf, 2e-10", 1).unwrap_err();
        assert!(matches!(err, NoiseError::MalformedRecord { field: 6, .. }));
    }

    #[test]
    fn corpus_keeps_valid_lines_around_bad_ones() {
        let text = format!(
            "{GOOD}\ngarbage line\n\n1024, 2, 3, 7, 1, x, 3e-10, 2e-10\n{GOOD}\n2048, 1\n"
        );
        let corpus = parse_corpus(text.as_bytes()).unwrap();
        assert_eq!(corpus.records.len(), 2);
        assert_eq!(corpus.row_errors.len(), 3);
        assert_eq!(corpus.lines_read, 6);
    }

    #[test]
    fn empty_corpus_is_not_an_error() {
        let corpus = parse_corpus("".as_bytes()).unwrap();
        assert!(corpus.records.is_empty());
        assert_eq!(corpus.lines_read, 0);
    }
}
