//! End-to-end generation loop: outline → units → prompt → gateway → sanitize → script.
//!
//! Units run strictly one after another: every prompt is seeded from the
//! script produced by all units before it.

use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use narrascript_gateway::GenerationGateway;
use narrascript_outline::parse_outline;
use narrascript_sanitizer::Sanitizer;
use narrascript_shared::{
    AppConfig, GatewayError, GenerationUnit, NarrascriptError, Result, SegmentRole,
};

use crate::accumulator::ScriptAccumulator;
use crate::context::ContextPolicy;
use crate::prompt::PromptComposer;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Knobs for one run of the loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How much earlier output each prompt sees.
    pub context: ContextPolicy,
    /// Pause between units, as a backend rate-limit courtesy.
    pub inter_unit_delay: Duration,
    /// Add the numbered outline to every prompt.
    pub include_outline_summary: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context: ContextPolicy::default(),
            inter_unit_delay: Duration::from_millis(2000),
            include_outline_summary: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            context: ContextPolicy::from_config(&config.context),
            inter_unit_delay: Duration::from_millis(config.defaults.inter_unit_delay_ms),
            include_outline_summary: config.context.include_outline_summary,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What happened to one successfully generated unit.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub total: usize,
    pub section_label: String,
    pub role: SegmentRole,
    pub prompt_chars: usize,
    /// SHA-256 of the exact prompt sent.
    pub prompt_hash: String,
    /// Word count before sanitizing.
    pub raw_words: usize,
    /// Word count of the appended segment.
    pub words: usize,
    pub dropped_lines: usize,
    pub removed_phrases: Vec<String>,
}

/// The unit at which a run stopped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub index: usize,
    pub error: GatewayError,
}

/// Conditions worth surfacing that do not stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// A segment came back empty after sanitizing.
    EmptySegment { index: usize },
    /// Several segments in a row came back empty.
    ConsecutiveEmptySegments { from: usize, to: usize },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySegment { index } => {
                write!(f, "segment {index} was empty after sanitizing")
            }
            Self::ConsecutiveEmptySegments { from, to } => write!(
                f,
                "segments {from} to {to} were all empty after sanitizing; \
                 the backend may be ignoring the prompt"
            ),
        }
    }
}

/// Result of a run, complete or halted.
#[derive(Debug)]
pub struct RunOutcome {
    /// The finalized script (trimmed). Holds only completed units when halted.
    pub script: String,
    pub units_planned: usize,
    pub segments: Vec<SegmentRecord>,
    pub halt: Option<Halt>,
    pub warnings: Vec<RunWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.halt.is_none()
    }

    pub fn units_completed(&self) -> usize {
        self.segments.len()
    }

    /// The script, or [`NarrascriptError::EmptyFinalScript`] when there is
    /// nothing to persist.
    pub fn document(&self) -> Result<&str> {
        if self.script.is_empty() {
            Err(NarrascriptError::EmptyFinalScript)
        } else {
            Ok(&self.script)
        }
    }

    /// The halting failure as a crate error, if the run stopped early.
    pub fn halt_error(&self) -> Option<NarrascriptError> {
        self.halt
            .as_ref()
            .map(|h| NarrascriptError::Gateway(h.error.clone()))
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before the prompt for `unit` is sent.
    fn unit_started(&self, unit: &GenerationUnit);
    /// Called after a segment has been appended.
    fn unit_finished(&self, record: &SegmentRecord);
    /// Called when a gateway failure stops the run.
    fn halted(&self, halt: &Halt);
    /// Called once the loop has ended.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn unit_started(&self, _unit: &GenerationUnit) {}
    fn unit_finished(&self, _record: &SegmentRecord) {}
    fn halted(&self, _halt: &Halt) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse `outline` and run every unit.
///
/// Fails only when the outline yields no units; a gateway failure is
/// reported through [`RunOutcome::halt`] together with the partial script.
#[instrument(skip_all, fields(outline_len = outline.len()))]
pub async fn generate_script(
    outline: &str,
    gateway: &dyn GenerationGateway,
    sanitizer: &Sanitizer,
    composer: &PromptComposer,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let units = parse_outline(outline)?;
    Ok(run_script(&units, gateway, sanitizer, composer, config, progress).await)
}

/// Run already-parsed units in order.
///
/// 1. Excerpt the script so far
/// 2. Compose the prompt
/// 3. Call the gateway (a failure halts the loop)
/// 4. Sanitize and append
/// 5. Pause before the next unit
#[instrument(skip_all, fields(units = units.len()))]
pub async fn run_script(
    units: &[GenerationUnit],
    gateway: &dyn GenerationGateway,
    sanitizer: &Sanitizer,
    composer: &PromptComposer,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> RunOutcome {
    let started_at = Utc::now();
    let start = Instant::now();

    let composer = if config.include_outline_summary {
        Cow::Owned(composer.clone().with_outline_summary(units))
    } else {
        Cow::Borrowed(composer)
    };

    let mut script = ScriptAccumulator::new();
    let mut segments = Vec::with_capacity(units.len());
    let mut warnings = Vec::new();
    let mut halt = None;
    let mut empty_since: Option<usize> = None;

    info!(total = units.len(), "starting generation");

    for (pos, unit) in units.iter().enumerate() {
        let role = unit.role();
        progress.unit_started(unit);
        info!(
            index = unit.index,
            total = unit.total,
            section = %unit.section_label,
            %role,
            "generating segment"
        );

        let context = config.context.excerpt(script.current());
        let prompt = composer.compose(unit, &context);
        debug!(
            index = unit.index,
            prompt_chars = prompt.len(),
            context_chars = context.len(),
            "prompt composed"
        );

        let raw = match gateway.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    index = unit.index,
                    kind = e.kind(),
                    error = %e,
                    "generation failed, halting run"
                );
                let stop = Halt {
                    index: unit.index,
                    error: e,
                };
                progress.halted(&stop);
                halt = Some(stop);
                break;
            }
        };

        let report = sanitizer.sanitize_with_report(&raw);
        for phrase in &report.removed_phrases {
            warn!(index = unit.index, %phrase, "removed disallowed phrase");
        }
        if !report.dropped_lines.is_empty() {
            debug!(
                index = unit.index,
                dropped = report.dropped_lines.len(),
                "dropped structural lines"
            );
        }

        if report.text.is_empty() {
            match empty_since {
                Some(from) => {
                    warn!(from, to = unit.index, "consecutive empty segments");
                    note_consecutive_empty(&mut warnings, from, unit.index);
                }
                None => {
                    warn!(index = unit.index, "segment empty after sanitizing");
                    warnings.push(RunWarning::EmptySegment { index: unit.index });
                    empty_since = Some(unit.index);
                }
            }
        } else {
            empty_since = None;
        }

        script.append(&report.text);

        let record = SegmentRecord {
            index: unit.index,
            total: unit.total,
            section_label: unit.section_label.clone(),
            role,
            prompt_chars: prompt.len(),
            prompt_hash: prompt_hash(&prompt),
            raw_words: raw.split_whitespace().count(),
            words: report.text.split_whitespace().count(),
            dropped_lines: report.dropped_lines.len(),
            removed_phrases: report.removed_phrases,
        };
        info!(index = unit.index, words = record.words, "segment appended");
        progress.unit_finished(&record);
        segments.push(record);

        let is_last = pos + 1 == units.len();
        if !is_last && !config.inter_unit_delay.is_zero() {
            tokio::time::sleep(config.inter_unit_delay).await;
        }
    }

    let outcome = RunOutcome {
        script: script.finalize(),
        units_planned: units.len(),
        segments,
        halt,
        warnings,
        started_at,
        finished_at: Utc::now(),
        elapsed: start.elapsed(),
    };

    info!(
        completed = outcome.units_completed(),
        planned = outcome.units_planned,
        chars = outcome.script.len(),
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "generation finished"
    );
    progress.done(&outcome);

    outcome
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extend the open streak warning, or start one.
fn note_consecutive_empty(warnings: &mut Vec<RunWarning>, from: usize, to: usize) {
    if let Some(RunWarning::ConsecutiveEmptySegments { from: open, to: end }) =
        warnings.last_mut()
    {
        if *open == from {
            *end = to;
            return;
        }
    }
    warnings.push(RunWarning::ConsecutiveEmptySegments { from, to });
}

/// SHA-256 of a prompt, hex-encoded.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
