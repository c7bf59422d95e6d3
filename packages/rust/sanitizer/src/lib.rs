//! Post-generation cleanup for narration segments.
//!
//! A raw segment from the backend goes through four passes, in order:
//! 1. line rejection (layout, labels, meta-commentary)
//! 2. inline cleanup (stage directions, emphasis markers, casual wording, contractions)
//! 3. removal of disallowed words and phrases
//! 4. re-joining of the surviving lines
//!
//! Every pass is driven by [`SanitizerConfig`] data; the sanitizer itself holds
//! no prose and never fails on input.

mod rules;

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use narrascript_shared::{NarrascriptError, Result, SanitizerConfig};

use crate::rules::{CompiledRule, compile, phrase_regex};

pub use rules::default_rules;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Outcome of sanitizing one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// The cleaned segment (possibly empty).
    pub text: String,
    /// Lines removed in the rejection pass.
    pub dropped_lines: Vec<DroppedLine>,
    /// Disallowed phrases that were found and removed, in config order.
    pub removed_phrases: Vec<String>,
}

/// A line removed by a line-scope rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLine {
    /// Name of the first rule that matched.
    pub rule: String,
    pub line: String,
}

/// Compiled, reusable segment sanitizer.
#[derive(Debug)]
pub struct Sanitizer {
    line_rules: Vec<CompiledRule>,
    inline_rules: Vec<CompiledRule>,
    casual_words: Vec<Swap>,
    contractions: Vec<Swap>,
    phrases: Vec<(String, Regex)>,
}

/// A whole-word substitution that keeps the leading capital.
#[derive(Debug)]
struct Swap {
    regex: Regex,
    replacement: String,
}

/// Working representation of a line between passes.
#[derive(Debug)]
enum Line {
    /// A blank source line; kept as a paragraph break.
    Break,
    Text(String),
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

impl Sanitizer {
    /// Compile a sanitizer from configuration.
    ///
    /// Fails only on bad configuration (invalid pattern, rule with an action
    /// its scope does not support).
    pub fn new(config: &SanitizerConfig) -> Result<Self> {
        let mut specs = if config.use_default_rules {
            default_rules()
        } else {
            Vec::new()
        };
        specs.extend(config.rules.iter().cloned());
        let (line_rules, inline_rules) = compile(&specs)?;

        let casual_words = compile_swaps(config.casual_words.iter())?;
        let contractions = compile_swaps(config.contractions.iter())?;

        // Longest first, so "let's dive in" goes before "dive" can split it.
        let mut phrase_list: Vec<&String> = config
            .disallowed_phrases
            .iter()
            .filter(|p| !p.trim().is_empty())
            .collect();
        phrase_list.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let phrases = phrase_list
            .into_iter()
            .map(|p| Ok((p.clone(), phrase_regex(p)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            line_rules,
            inline_rules,
            casual_words,
            contractions,
            phrases,
        })
    }

    /// Sanitizer with the built-in rules and tables.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&SanitizerConfig::default())
    }

    /// Clean a raw segment.
    pub fn sanitize(&self, raw: &str) -> String {
        self.sanitize_with_report(raw).text
    }

    /// Clean a raw segment and report what was removed.
    pub fn sanitize_with_report(&self, raw: &str) -> SanitizeReport {
        let mut report = SanitizeReport::default();

        // Pass 1: line rejection
        let mut lines: Vec<Line> = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                lines.push(Line::Break);
                continue;
            }
            if self.reject(line, &mut report) {
                continue;
            }
            lines.push(Line::Text(line.to_string()));
        }

        // Passes 2 and 3 operate on surviving text lines only. A line they
        // reshape is checked against the line rules again.
        let lines: Vec<Line> = lines
            .into_iter()
            .filter_map(|line| match line {
                Line::Break => Some(Line::Break),
                Line::Text(text) => {
                    let cleaned = self.clean_inline(&text);
                    let cleaned = self.remove_phrases(&cleaned, &mut report.removed_phrases);
                    if cleaned != text && self.reject(&cleaned, &mut report) {
                        None
                    } else {
                        Some(Line::Text(cleaned))
                    }
                }
            })
            .collect();

        // Pass 4: re-join
        report.text = join_lines(lines);
        report
    }

    /// Pass 1 for one line: record and return true if a line rule rejects it.
    fn reject(&self, line: &str, report: &mut SanitizeReport) -> bool {
        let Some(rule) = self.line_rules.iter().find(|r| r.regex.is_match(line)) else {
            return false;
        };
        debug!(rule = %rule.name, line, "dropping line");
        report.dropped_lines.push(DroppedLine {
            rule: rule.name.clone(),
            line: line.to_string(),
        });
        true
    }

    /// Pass 2: inline rules, then casual wording, then contractions.
    fn clean_inline(&self, line: &str) -> String {
        let mut result = line.to_string();

        for rule in &self.inline_rules {
            result = rule
                .regex
                .replace_all(&result, rule.with.as_str())
                .into_owned();
        }
        for swap in self.casual_words.iter().chain(&self.contractions) {
            result = swap.apply(&result);
        }

        tidy_spacing(&result)
    }

    /// Pass 3: strip disallowed phrases, recording each one found.
    fn remove_phrases(&self, line: &str, removed: &mut Vec<String>) -> String {
        let mut result = line.to_string();
        let mut changed = false;

        for (phrase, regex) in &self.phrases {
            if regex.is_match(&result) {
                result = regex.replace_all(&result, "").into_owned();
                changed = true;
                if !removed.contains(phrase) {
                    removed.push(phrase.clone());
                }
            }
        }

        if !changed {
            return result;
        }

        let tidied = tidy_spacing(&result);
        // Removing a sentence opener should not leave it lower-cased.
        if line.chars().next().is_some_and(char::is_uppercase) {
            capitalize_first(&tidied)
        } else {
            tidied
        }
    }
}

impl Swap {
    fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, |caps: &Captures| match_case(&caps[0], &self.replacement))
            .into_owned()
    }
}

fn compile_swaps<'a>(
    table: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<Vec<Swap>> {
    let mut swaps = table
        .filter(|(from, _)| !from.trim().is_empty())
        .map(|(from, to)| {
            Ok((
                from.len(),
                Swap {
                    regex: phrase_regex(from)?,
                    replacement: to.clone(),
                },
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    // Longer phrasings first so they win over any shorter overlap.
    swaps.sort_by_key(|(len, _)| std::cmp::Reverse(*len));
    Ok(swaps.into_iter().map(|(_, swap)| swap).collect())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collapse space runs, pull punctuation back onto its word, and trim.
fn tidy_spacing(line: &str) -> String {
    static SPACE_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));
    static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+([,.!?;:])").expect("valid regex"));
    static ORPHAN_SEPARATOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[,;:]([.!?])").expect("valid regex"));
    static LEADING_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\s,;:.]+").expect("valid regex"));

    let result = SPACE_RUN_RE.replace_all(line, " ");
    let result = SPACE_BEFORE_PUNCT_RE.replace_all(&result, "${1}");
    let result = ORPHAN_SEPARATOR_RE.replace_all(&result, "${1}");
    let result = LEADING_PUNCT_RE.replace(&result, "");
    result.trim().to_string()
}

/// Join lines, keeping single blank lines between paragraphs.
///
/// Text lines left without any letters or digits by earlier passes are
/// dropped rather than kept as noise.
fn join_lines(lines: Vec<Line>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending_break = false;

    for line in lines {
        match line {
            Line::Break => pending_break = !out.is_empty(),
            Line::Text(text) if text.chars().any(char::is_alphanumeric) => {
                if pending_break {
                    out.push(String::new());
                    pending_break = false;
                }
                out.push(text);
            }
            Line::Text(_) => {}
        }
    }

    out.join("\n").trim().to_string()
}

/// Give `replacement` a leading capital when `found` had one.
fn match_case(found: &str, replacement: &str) -> String {
    if found.chars().next().is_some_and(char::is_uppercase) {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Build a sanitizer or explain which rule is broken.
///
/// Convenience for callers that only hold the raw rule list.
pub fn sanitizer_from(config: &SanitizerConfig) -> Result<Sanitizer> {
    Sanitizer::new(config).map_err(|e| match e {
        NarrascriptError::Validation { message } => {
            NarrascriptError::config(format!("invalid [sanitizer] section: {message}"))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
