//! Built-in rule set and rule compilation.

use regex::{Regex, RegexBuilder};

use narrascript_shared::{NarrascriptError, Result, RuleAction, RuleScope, RuleSpec};

/// Structural rules applied unless `use_default_rules = false`.
///
/// Line rules reject lines that are layout or commentary rather than
/// narration. Inline rules clean markup inside lines that survive.
pub fn default_rules() -> Vec<RuleSpec> {
    vec![
        // --- line rejection ---
        // Up to three digits, so a sentence opening with a year survives.
        RuleSpec::drop_line("list-marker", r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+"),
        RuleSpec::drop_line("heading", r"^\s*#{1,6}(?:\s|$)"),
        RuleSpec::drop_line(
            "emphasis-only",
            r"^\s*(?:\*{1,3}|_{1,3})[^*_]+(?:\*{1,3}|_{1,3})\s*:?\s*$",
        ),
        RuleSpec::drop_line("bracketed-note", r"^\s*(?:\[[^\]]*\]|\([^)]*\))\s*$"),
        RuleSpec::drop_line("table-row", r"^\s*\|.*\|\s*$"),
        RuleSpec::drop_line("punctuation-only", r"^[\s\p{P}\p{S}]+$"),
        RuleSpec::drop_line("too-short", r"^\s*.{1,2}\s*$"),
        RuleSpec::drop_line("label", r":\s*$"),
        RuleSpec::drop_line(
            "meta-commentary",
            r"(?i)\bnote:|\bword count\b|\bplease provide\b|\backnowledge",
        ),
        RuleSpec::drop_line(
            "meta-heading",
            r"(?i)^\s*(?:point\s+\d+\b|end of (?:section|part|segment|script)\b|preparation for\b|continuity notes?\b|generating story\b|tone:|events:|character development:|to be continued\b)",
        ),
        // --- inline cleanup ---
        RuleSpec::strip("stage-direction", r"\s*\([^)]*\)"),
        RuleSpec::strip("bracketed-aside", r"\s*\[[^\]]*\]"),
        RuleSpec::replace("bold", r"\*\*([^*]+)\*\*", "${1}"),
        RuleSpec::replace("bold-underscore", r"__([^_]+)__", "${1}"),
        RuleSpec::replace("italic", r"\*([^*]+)\*", "${1}"),
        RuleSpec::replace("italic-underscore", r"\b_([^_]+)_\b", "${1}"),
        RuleSpec::strip("heading-marker", r"^\s*#+\s*"),
        RuleSpec::strip(
            "speaker-label",
            r"(?i)^\s*(?:narrator|voice-?over|v\.?o\.?|host)\s*:\s*",
        ),
    ]
}

/// A rule ready to run.
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub name: String,
    pub regex: Regex,
    /// Replacement text; empty for strip rules.
    pub with: String,
}

/// Compile a rule list, splitting it into line and inline passes.
///
/// Line rules must drop lines and inline rules must strip or replace; any
/// other combination is a configuration mistake and is rejected.
pub(crate) fn compile(specs: &[RuleSpec]) -> Result<(Vec<CompiledRule>, Vec<CompiledRule>)> {
    let mut line_rules = Vec::new();
    let mut inline_rules = Vec::new();

    for spec in specs {
        let regex = Regex::new(&spec.pattern).map_err(|e| {
            NarrascriptError::validation(format!("sanitizer rule '{}': {e}", spec.name))
        })?;

        match (spec.scope, spec.action) {
            (RuleScope::Line, RuleAction::DropLine) => line_rules.push(CompiledRule {
                name: spec.name.clone(),
                regex,
                with: String::new(),
            }),
            (RuleScope::Inline, RuleAction::Strip) => inline_rules.push(CompiledRule {
                name: spec.name.clone(),
                regex,
                with: String::new(),
            }),
            (RuleScope::Inline, RuleAction::Replace) => {
                let with = spec.with.clone().ok_or_else(|| {
                    NarrascriptError::validation(format!(
                        "sanitizer rule '{}': replace action needs a `with` value",
                        spec.name
                    ))
                })?;
                inline_rules.push(CompiledRule {
                    name: spec.name.clone(),
                    regex,
                    with,
                });
            }
            (scope, action) => {
                return Err(NarrascriptError::validation(format!(
                    "sanitizer rule '{}': action {action:?} is not valid for {scope:?} scope",
                    spec.name
                )));
            }
        }
    }

    Ok((line_rules, inline_rules))
}

/// Case-insensitive whole-word pattern for a word or phrase.
///
/// Internal whitespace matches any run of whitespace and a straight
/// apostrophe also matches a typographic one.
pub(crate) fn phrase_regex(phrase: &str) -> Result<Regex> {
    let body = phrase
        .split_whitespace()
        .map(|word| regex::escape(word).replace('\'', "['’]"))
        .collect::<Vec<_>>()
        .join(r"\s+");

    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(phrase.trim().chars().next()) { r"\b" } else { "" };
    let tail = if is_word(phrase.trim().chars().last()) { r"\b" } else { "" };

    RegexBuilder::new(&format!("{lead}{body}{tail}"))
        .case_insensitive(true)
        .build()
        .map_err(|e| NarrascriptError::validation(format!("phrase '{phrase}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_compile() {
        let (line, inline) = compile(&default_rules()).expect("compile defaults");
        assert_eq!(line.len(), 10);
        assert_eq!(inline.len(), 8);
    }

    #[test]
    fn mismatched_scope_and_action_rejected() {
        let mut spec = RuleSpec::strip("oops", "x");
        spec.scope = RuleScope::Line;
        let err = compile(&[spec]).unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn replace_without_with_rejected() {
        let mut spec = RuleSpec::replace("swap", "a", "b");
        spec.with = None;
        assert!(compile(&[spec]).is_err());
    }

    #[test]
    fn invalid_pattern_rejected() {
        let spec = RuleSpec::drop_line("broken", "(unclosed");
        let err = compile(&[spec]).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn phrase_regex_whole_word_only() {
        let re = phrase_regex("dive").unwrap();
        assert!(re.is_match("Let's DIVE in"));
        assert!(!re.is_match("a diver jumped"));
    }

    #[test]
    fn phrase_regex_matches_curly_apostrophe_and_spacing() {
        let re = phrase_regex("let's dive in").unwrap();
        assert!(re.is_match("So let’s  dive in now"));
    }

    #[test]
    fn too_short_rule_counts_trimmed_chars() {
        let re = Regex::new(r"^\s*.{1,2}\s*$").unwrap();
        assert!(re.is_match("  ok  "));
        assert!(re.is_match("."));
        assert!(!re.is_match("a b"));
        assert!(!re.is_match("Yes."));
    }
}
