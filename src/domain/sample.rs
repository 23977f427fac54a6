// ============================================================
// Layer 3 — Sample Domain Type
// ============================================================
// One raw record produced by a SampleReader: field name → value.
// For the referenceless variant the fields are
//   src   — source sentence
//   mt    — machine translation being scored
//   score — gold quality score (absent at inference time)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ModelError, ModelResult};

/// A single cell of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Parse a raw cell. Anything that reads as a finite float is a number.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => SampleValue::Number(v),
            _ => SampleValue::Text(raw.to_string()),
        }
    }

    /// Text view of the value. Numbers are rendered, so a numeric-looking
    /// sentence ("2024") is still usable as model input.
    pub fn as_text(&self) -> String {
        match self {
            SampleValue::Text(s) => s.clone(),
            SampleValue::Number(v) => v.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SampleValue::Number(v) => Some(*v),
            SampleValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub fields: BTreeMap<String, SampleValue>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and small fixtures.
    pub fn with(mut self, name: impl Into<String>, value: SampleValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn text(&self, name: &str) -> ModelResult<String> {
        self.fields
            .get(name)
            .map(SampleValue::as_text)
            .ok_or_else(|| ModelError::MissingField(name.to_string()))
    }

    /// The gold score, if the sample carries one.
    pub fn score(&self) -> Option<f64> {
        self.fields.get("score").and_then(SampleValue::as_number)
    }
}
