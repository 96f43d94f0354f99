//! Normalization of analysis output into a canonical report.
//!
//! The text-generation side may hand back either a structured mapping or free
//! text. Both go through [`AnalysisOutput::normalize`], which is the only place
//! that inspects the shape of the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder for report fields the analysis did not provide.
pub const NOT_AVAILABLE: &str = "Not available";

/// Number of characters of raw text kept in a synthesized summary.
pub const SUMMARY_PREVIEW_LEN: usize = 200;

/// Output of the analysis collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisOutput {
    Structured(Map<String, Value>),
    Raw(String),
}

/// Canonical structured analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub roi: Value,
    pub cap_rate: Value,
    pub cash_flow: Value,
    pub appreciation: Value,
    pub risk_assessment: Value,
    pub recommendations: Value,
    pub summary: Value,
    /// Fields beyond the canonical set, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Result of normalizing an [`AnalysisOutput`].
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedAnalysis {
    pub report: AnalysisReport,
    /// Raw text as produced, or the serialized mapping for structured output.
    pub raw_text: String,
    /// Whether the report was synthesized from unstructured text.
    pub synthesized: bool,
}

impl AnalysisOutput {
    pub fn normalize(self) -> NormalizedAnalysis {
        match self {
            AnalysisOutput::Structured(map) => {
                let raw_text = Value::Object(map.clone()).to_string();
                NormalizedAnalysis {
                    report: AnalysisReport::from_map(map),
                    raw_text,
                    synthesized: false,
                }
            }
            AnalysisOutput::Raw(text) => match serde_json::from_str::<Value>(text.trim()) {
                Ok(Value::Object(map)) => NormalizedAnalysis {
                    report: AnalysisReport::from_map(map),
                    raw_text: text,
                    synthesized: false,
                },
                _ => NormalizedAnalysis {
                    report: AnalysisReport::placeholder(&text),
                    raw_text: text,
                    synthesized: true,
                },
            },
        }
    }
}

impl AnalysisReport {
    fn from_map(mut map: Map<String, Value>) -> Self {
        let mut take = |key: &str| {
            map.remove(key)
                .unwrap_or_else(|| Value::String(NOT_AVAILABLE.to_owned()))
        };
        let roi = take("roi");
        let cap_rate = take("cap_rate");
        let cash_flow = take("cash_flow");
        let appreciation = take("appreciation");
        let risk_assessment = take("risk_assessment");
        let recommendations = take("recommendations");
        let summary = take("summary");

        Self {
            roi,
            cap_rate,
            cash_flow,
            appreciation,
            risk_assessment,
            recommendations,
            summary,
            extra: map.into_iter().collect(),
        }
    }

    /// Report synthesized from unstructured text.
    pub fn placeholder(text: &str) -> Self {
        let na = || Value::String(NOT_AVAILABLE.to_owned());
        Self {
            roi: na(),
            cap_rate: na(),
            cash_flow: na(),
            appreciation: na(),
            risk_assessment: na(),
            recommendations: na(),
            summary: Value::String(format!("{}...", preview(text, SUMMARY_PREVIEW_LEN))),
            extra: BTreeMap::new(),
        }
    }

    /// Summary as plain text.
    pub fn summary_text(&self) -> String {
        match &self.summary {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// JSON form written to the ledger as the task result.
    pub fn to_ledger_string(&self) -> String {
        // Maps of JSON values always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
