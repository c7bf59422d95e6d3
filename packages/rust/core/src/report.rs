//! Writing the finished script and its run report to disk.
//!
//! Layout next to the chosen output file:
//! ```text
//! <output>            the script (only when non-empty)
//! <output>.run.json   the run report (also for halted runs)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use narrascript_shared::{NarrascriptError, Result};

use crate::pipeline::{RunOutcome, RunWarning, SegmentRecord};

/// Report format version.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Halted,
    /// Every unit ran but nothing survived sanitizing.
    Empty,
}

/// Where and why a run stopped.
#[derive(Debug, Clone, Serialize)]
pub struct HaltSummary {
    pub index: usize,
    /// Machine-friendly failure kind (`timeout`, `non_success_status`, ...).
    pub kind: String,
    pub message: String,
}

/// JSON sidecar describing one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub model: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub units_planned: usize,
    pub units_completed: usize,
    /// Script path, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub script_words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<HaltSummary>,
    pub warnings: Vec<RunWarning>,
    pub segments: Vec<SegmentRecord>,
}

impl RunReport {
    /// Build the report for `outcome`; `output_file` is the script path if
    /// it was written.
    pub fn new(outcome: &RunOutcome, model: &str, output_file: Option<&Path>) -> Self {
        let status = match (&outcome.halt, outcome.script.is_empty()) {
            (Some(_), _) => RunStatus::Halted,
            (None, true) => RunStatus::Empty,
            (None, false) => RunStatus::Complete,
        };

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            run_id: Uuid::now_v7(),
            model: model.to_string(),
            status,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            units_planned: outcome.units_planned,
            units_completed: outcome.units_completed(),
            output_file: output_file.map(|p| p.display().to_string()),
            script_words: outcome.script.split_whitespace().count(),
            halt: outcome.halt.as_ref().map(|h| HaltSummary {
                index: h.index,
                kind: h.error.kind().to_string(),
                message: h.error.to_string(),
            }),
            warnings: outcome.warnings.clone(),
            segments: outcome.segments.clone(),
        }
    }
}

/// Sidecar path for a script: `story.txt` → `story.txt.run.json`.
pub fn report_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".run.json");
    PathBuf::from(name)
}

/// Write the script exactly as given (UTF-8), creating parent directories.
///
/// Refuses to write an empty script.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_script(path: &Path, script: &str) -> Result<()> {
    if script.trim().is_empty() {
        return Err(NarrascriptError::EmptyFinalScript);
    }

    ensure_parent(path)?;
    std::fs::write(path, script).map_err(|e| NarrascriptError::io(path, e))?;

    info!(chars = script.len(), "script written");
    Ok(())
}

/// Write the run report (pretty-printed JSON).
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| NarrascriptError::Serialization(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| NarrascriptError::io(path, e))?;
    debug!(path = %path.display(), "wrote run report");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| NarrascriptError::io(parent, e))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use narrascript_shared::{GatewayError, SegmentRole};

    use crate::pipeline::Halt;

    fn record(index: usize) -> SegmentRecord {
        SegmentRecord {
            index,
            total: 3,
            section_label: "Act One".into(),
            role: SegmentRole::classify(index, 3),
            prompt_chars: 100,
            prompt_hash: "ab".repeat(32),
            raw_words: 12,
            words: 10,
            dropped_lines: 1,
            removed_phrases: vec![],
        }
    }

    fn outcome(script: &str, halt: Option<Halt>) -> RunOutcome {
        let now = Utc::now();
        RunOutcome {
            script: script.into(),
            units_planned: 3,
            segments: vec![record(1)],
            halt,
            warnings: vec![],
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn report_path_appends_suffix() {
        assert_eq!(
            report_path(Path::new("out/generated_story.txt")),
            PathBuf::from("out/generated_story.txt.run.json")
        );
    }

    #[test]
    fn write_script_creates_dirs_and_writes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("story.txt");

        write_script(&path, "Hello world.\n\nGoodbye.").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Hello world.\n\nGoodbye.");
    }

    #[test]
    fn write_script_refuses_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.txt");

        let err = write_script(&path, "  \n").unwrap_err();
        assert!(matches!(err, NarrascriptError::EmptyFinalScript));
        assert!(!path.exists());
    }

    #[test]
    fn halted_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.txt.run.json");
        let outcome = outcome(
            "Unit one.",
            Some(Halt {
                index: 2,
                error: GatewayError::Timeout,
            }),
        );

        let report = RunReport::new(&outcome, "test/model", None);
        write_report(&path, &report).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "halted");
        assert_eq!(json["halt"]["index"], 2);
        assert_eq!(json["halt"]["kind"], "timeout");
        assert_eq!(json["units_planned"], 3);
        assert_eq!(json["units_completed"], 1);
        assert_eq!(json["model"], "test/model");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["segments"][0]["role"], "opening");
        assert!(json.get("output_file").is_none());
    }

    #[test]
    fn status_reflects_outcome() {
        let complete = RunReport::new(&outcome("Done.", None), "m", Some(Path::new("a.txt")));
        assert_eq!(complete.status, RunStatus::Complete);
        assert_eq!(complete.output_file.as_deref(), Some("a.txt"));
        assert_eq!(complete.script_words, 1);

        let empty = RunReport::new(&outcome("", None), "m", None);
        assert_eq!(empty.status, RunStatus::Empty);
    }

    #[test]
    fn run_ids_are_unique() {
        let o = outcome("Done.", None);
        assert_ne!(RunReport::new(&o, "m", None).run_id, RunReport::new(&o, "m", None).run_id);
    }
}
