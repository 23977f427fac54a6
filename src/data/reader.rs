// ============================================================
// Layer 4 — CSV Sample Reader
// ============================================================
// Reads a headed CSV file into Samples, one per row, in file
// order. Numeric columns (just "score") must parse as finite
// floats; every other column is kept as
// raw text, so a sentence like "1.50" reaches the tokenizer
// unchanged.
//
//   src,mt,score
//   "Das Haus ist rot.","The house is red.",0.82

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::domain::{
    sample::{Sample, SampleValue},
    traits::SampleReader,
};

pub struct CsvSampleReader {
    numeric_columns: Vec<String>,
}

impl Default for CsvSampleReader {
    fn default() -> Self {
        Self { numeric_columns: vec!["score".to_string()] }
    }
}

impl CsvSampleReader {
    /// Parse CSV content that is already in memory.
    pub fn read_from<R: std::io::Read>(&self, source: R) -> Result<Vec<Sample>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(source);
        let headers = reader.headers().context("CSV file has no header row")?.clone();

        let mut samples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV row {}", row + 1))?;
            let mut sample = Sample::new();
            for (name, raw) in headers.iter().zip(record.iter()) {
                let value = if self.numeric_columns.iter().any(|c| c == name) {
                    match SampleValue::parse(raw) {
                        number @ SampleValue::Number(_) => number,
                        SampleValue::Text(_) => {
                            bail!("Row {}: column '{}' is not a number: '{}'", row + 1, name, raw)
                        }
                    }
                } else {
                    SampleValue::Text(raw.to_string())
                };
                sample.fields.insert(name.to_string(), value);
            }
            samples.push(sample);
        }
        Ok(samples)
    }
}

impl SampleReader for CsvSampleReader {
    fn read_samples(&self, path: &Path) -> Result<Vec<Sample>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open data file '{}'", path.display()))?;
        let samples = self
            .read_from(file)
            .with_context(|| format!("Cannot parse '{}'", path.display()))?;
        tracing::info!("Read {} samples from '{}'", samples.len(), path.display());
        Ok(samples)
    }
}
