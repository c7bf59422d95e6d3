//! Core generation pipeline for narrascript.
//!
//! This crate ties together outline parsing, prompt composition, the
//! generation gateway and output sanitizing into one sequential loop
//! ([`pipeline::generate_script`]), then persists the result ([`report`]).

pub mod accumulator;
pub mod context;
pub mod pipeline;
pub mod prompt;
pub mod report;

pub use accumulator::ScriptAccumulator;
pub use context::{ContextPolicy, trailing_sentences};
pub use pipeline::{
    Halt, PipelineConfig, ProgressReporter, RunOutcome, RunWarning, SegmentRecord,
    SilentProgress, generate_script, run_script,
};
pub use prompt::{PromptComposer, RuleBlocks};
pub use report::{RunReport, RunStatus, report_path, write_report, write_script};
