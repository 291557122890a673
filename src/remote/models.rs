// ABOUTME: Data structures for batch payloads and remote error responses
// ABOUTME: These are serialized to JSON for API communication

use serde::{Deserialize, Serialize};

use crate::scheduler::job::JobId;
use crate::scheduler::partition::RowRange;

/// Payload for one ad copy batch.
///
/// The remote side fills in generated results (headlines, descriptions,
/// per-row status); they are kept verbatim in `annotations` so the final
/// results file carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub start_row: u32,
    pub end_row: u32,
    #[serde(flatten)]
    pub annotations: serde_json::Map<String, serde_json::Value>,
}

impl BatchPayload {
    pub fn rows(&self) -> RowRange {
        RowRange::new(self.start_row, self.end_row)
    }
}

impl From<RowRange> for BatchPayload {
    fn from(range: RowRange) -> Self {
        Self {
            start_row: range.start_row,
            end_row: range.end_row,
            annotations: serde_json::Map::new(),
        }
    }
}

/// Error body produced when a remote call is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    pub error: String,
}

impl ErrorPayload {
    pub fn new(id: Option<JobId>, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Job, JobStatus};

    #[test]
    fn test_batch_payload_keeps_remote_results() {
        let raw = r#"{
            "id": 2,
            "startRow": 42,
            "endRow": 61,
            "endedAt": "2026-01-05T10:01:30Z",
            "rowsWritten": 20,
            "headlines": ["Fast shipping", "Top rated"]
        }"#;
        let job: Job<BatchPayload> = serde_json::from_str(raw).unwrap();
        assert_eq!(job.payload.rows(), RowRange::new(42, 61));
        assert_eq!(job.payload.annotations["rowsWritten"], 20);
        assert_eq!(job.payload.annotations["headlines"][1], "Top rated");
        assert!(!job.payload.annotations.contains_key("endedAt"));

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["rowsWritten"], 20);
        assert_eq!(back["status"], serde_json::to_value(JobStatus::Pending).unwrap());
    }

    #[test]
    fn test_error_payload_json() {
        let payload = ErrorPayload::new(Some(JobId(3)), "HTTP 500");
        assert_eq!(payload.to_json(), r#"{"id":3,"error":"HTTP 500"}"#);

        let anonymous = ErrorPayload::new(None, "connection refused");
        assert_eq!(anonymous.to_json(), r#"{"error":"connection refused"}"#);
    }
}
