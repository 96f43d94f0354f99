//! Size limits for strings written to the ledger.

use serde_json::json;

use crate::analysis::{preview, AnalysisReport, SUMMARY_PREVIEW_LEN};

/// Maximum number of characters in any string written to the ledger.
pub const MAX_LEDGER_PAYLOAD_LEN: usize = 7500;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Reserved tail when truncating a topic.
const TOPIC_TRUNCATION_RESERVE: usize = 30;

/// Note placed in summarized results.
pub const LOCAL_STORAGE_NOTE: &str = "Full analysis available in local storage";

/// Returns the result string to write to the ledger.
///
/// Strings within the limit pass through unchanged. Oversized results are
/// replaced by a summary object that points at local storage.
pub fn fit_result_payload(result: String, report: &AnalysisReport) -> String {
    if result.chars().count() <= MAX_LEDGER_PAYLOAD_LEN {
        return result;
    }

    let summary = report.summary_text();
    json!({
        "summary": preview(&summary, SUMMARY_PREVIEW_LEN),
        "note": LOCAL_STORAGE_NOTE,
    })
    .to_string()
}

/// Returns the topic string to write to the ledger, truncating if oversized.
pub fn fit_topic_payload(topic: String) -> String {
    if topic.chars().count() <= MAX_LEDGER_PAYLOAD_LEN {
        return topic;
    }

    let keep = MAX_LEDGER_PAYLOAD_LEN - TOPIC_TRUNCATION_RESERVE;
    format!("{}{TRUNCATION_MARKER}", preview(&topic, keep))
}
