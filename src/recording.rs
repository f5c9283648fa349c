//! Summary of a transcribed and analysed voice recording.

use crate::context::{Diagnostic, StepOutputs};
use crate::error::StepError;
use crate::file_ref::shape_name;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transcriptions shorter than this get a `_warning_empty`.
pub const SHORT_TRANSCRIPTION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Success,
    Warning,
    Error,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Success => "success",
            RecordingStatus::Warning => "warning",
            RecordingStatus::Error => "error",
        }
    }
}

/// Result record plus its diagnostic variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingReport {
    pub status: RecordingStatus,
    pub message: String,
    pub transcription: String,
    pub agent_analysis: String,
    pub file_path: String,
    /// UTC, RFC 3339.
    pub timestamp: String,
    pub info_process: Option<String>,
    pub info_transcription: Option<String>,
    pub warning_empty: Option<String>,
    pub error_process: Option<String>,
}

fn as_text<'a>(name: &str, value: &'a Value) -> Result<&'a str, StepError> {
    value
        .as_str()
        .ok_or_else(|| StepError::invalid(name, format!("expected text, got {}", shape_name(value))))
}

/// Combine the transcription and agent reply into a report.
///
/// Inputs that are not text yield an `error` report rather than a failure.
pub fn summarize_recording(
    file_path: &str,
    transcription: &Value,
    agent_result: &Value,
    now: DateTime<Utc>,
) -> RecordingReport {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    let texts = as_text("transcription_result", transcription)
        .and_then(|t| Ok((t, as_text("agent_result", agent_result)?)));

    let (transcription, agent) = match texts {
        Ok((t, a)) => (t.trim(), a.trim()),
        Err(e) => {
            return RecordingReport {
                status: RecordingStatus::Error,
                message: format!("Error processing transcription: {e}"),
                transcription: String::new(),
                agent_analysis: String::new(),
                file_path: file_path.to_string(),
                timestamp,
                info_process: None,
                info_transcription: None,
                warning_empty: None,
                error_process: Some(format!("Exception during processing: {e}")),
            }
        }
    };

    if transcription.is_empty() {
        return RecordingReport {
            status: RecordingStatus::Warning,
            message: "Transcription completed but no text was extracted".to_string(),
            transcription: String::new(),
            agent_analysis: agent.to_string(),
            file_path: file_path.to_string(),
            timestamp,
            info_process: Some("Processing completed with empty result".to_string()),
            info_transcription: None,
            warning_empty: Some("No text was transcribed from the audio file".to_string()),
            error_process: None,
        };
    }

    let len = transcription.chars().count();
    RecordingReport {
        status: RecordingStatus::Success,
        message: "Voice recording transcribed and analyzed successfully".to_string(),
        transcription: transcription.to_string(),
        agent_analysis: agent.to_string(),
        file_path: file_path.to_string(),
        timestamp,
        info_process: Some(format!("Processing complete - File: {file_path}")),
        info_transcription: Some(format!("Transcribed {len} characters, analyzed by agent")),
        warning_empty: (len < SHORT_TRANSCRIPTION_CHARS).then(|| {
            format!("Transcription is very short ({len} chars) - may be empty or unclear audio")
        }),
        error_process: None,
    }
}

impl RecordingReport {
    /// Write the report as step outputs.
    pub fn into_outputs(self) -> Result<StepOutputs, StepError> {
        let mut out = StepOutputs::new();
        out.set("status", self.status.as_str())?;
        out.set("message", self.message)?;
        out.set("transcription", self.transcription)?;
        out.set("agent_analysis", self.agent_analysis)?;
        out.set("file_path", self.file_path)?;
        out.set("timestamp", self.timestamp)?;
        out.diagnostic(Diagnostic::Info, "process", self.info_process)?;
        out.diagnostic(Diagnostic::Info, "transcription", self.info_transcription)?;
        out.diagnostic(Diagnostic::Warning, "empty", self.warning_empty)?;
        out.diagnostic(Diagnostic::Error, "process", self.error_process)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn success_with_text() {
        let r = summarize_recording(
            "/uploads/memo.m4a",
            &json!("  I need an appointment next week  "),
            &json!("Intent: booking\n"),
            at(),
        );
        assert_eq!(r.status, RecordingStatus::Success);
        assert_eq!(r.transcription, "I need an appointment next week");
        assert_eq!(r.agent_analysis, "Intent: booking");
        assert_eq!(r.timestamp, "2024-05-01T09:30:00.000000Z");
        assert_eq!(
            r.info_process.as_deref(),
            Some("Processing complete - File: /uploads/memo.m4a")
        );
        assert_eq!(r.warning_empty, None);
    }

    #[test]
    fn short_text_warns() {
        let r = summarize_recording("f", &json!("hello"), &json!(""), at());
        assert_eq!(r.status, RecordingStatus::Success);
        assert_eq!(
            r.warning_empty.as_deref(),
            Some("Transcription is very short (5 chars) - may be empty or unclear audio")
        );
    }

    #[test]
    fn empty_text_is_a_warning() {
        let r = summarize_recording("f", &json!("   "), &json!("n/a"), at());
        assert_eq!(r.status, RecordingStatus::Warning);
        assert_eq!(r.message, "Transcription completed but no text was extracted");
        assert_eq!(r.info_transcription, None);
    }

    #[test]
    fn non_text_input_is_an_error_report() {
        let r = summarize_recording("f", &json!({"text": "x"}), &json!("a"), at());
        assert_eq!(r.status, RecordingStatus::Error);
        assert!(r.error_process.unwrap().starts_with("Exception during processing:"));
        assert!(r.transcription.is_empty());
    }

    #[test]
    fn outputs_define_every_diagnostic() {
        let out = summarize_recording("f", &json!("long enough text"), &json!("a"), at())
            .into_outputs()
            .unwrap();
        assert_eq!(out.get("status"), Some(&json!("success")));
        assert_eq!(out.get("_warning_empty"), Some(&Value::Null));
        assert_eq!(out.get("_error_process"), Some(&Value::Null));
        assert_eq!(out.len(), 10);
    }
}
