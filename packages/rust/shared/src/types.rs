//! Core domain types for narration script generation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GenerationUnit
// ---------------------------------------------------------------------------

/// One outline beat plus its position metadata.
///
/// Produced by the outline parser and never mutated afterwards. `index` is
/// 1-based and dense: the n-th emitted unit has `index == n`, and every unit of
/// one outline shares the same `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationUnit {
    /// Enclosing section title (empty for flat outlines).
    pub section_label: String,
    /// The beat to expand, with its list marker stripped.
    pub instruction: String,
    /// 1-based position in emission order.
    pub index: usize,
    /// Number of units in the outline.
    pub total: usize,
}

impl GenerationUnit {
    /// Position role of this unit within its outline.
    pub fn role(&self) -> SegmentRole {
        SegmentRole::classify(self.index, self.total)
    }
}

// ---------------------------------------------------------------------------
// SegmentRole
// ---------------------------------------------------------------------------

/// Where a unit sits in the script, which selects the prompt variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRole {
    Opening,
    Interior,
    Closing,
}

impl SegmentRole {
    /// Classify a unit from its 1-based `index` and the outline `total`.
    ///
    /// Opening wins when a unit is both first and last (`total == 1`): a
    /// single-unit script still needs the attention-grabbing start, and the
    /// opening prompt is the only one that is not told to continue prior text.
    pub fn classify(index: usize, total: usize) -> Self {
        if index <= 1 {
            Self::Opening
        } else if index >= total {
            Self::Closing
        } else {
            Self::Interior
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Interior => "interior",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WordTarget
// ---------------------------------------------------------------------------

/// Requested length of one generated segment.
///
/// The backend treats this as a suggestion; nothing downstream enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTarget {
    /// Lower bound, or the approximate target when `max` is absent.
    pub min: u32,
    /// Upper bound of a range target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl WordTarget {
    pub const fn approx(words: u32) -> Self {
        Self {
            min: words,
            max: None,
        }
    }

    pub const fn range(min: u32, max: u32) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }
}

impl std::fmt::Display for WordTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) if max > self.min => write!(f, "{}-{} words", self.min, max),
            _ => write!(f, "approximately {} words", self.min),
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitizer rule specs
// ---------------------------------------------------------------------------

/// Which text a sanitizer rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Matched against each whole line; used to reject structural noise.
    Line,
    /// Matched within surviving lines; used to clean markup in place.
    Inline,
}

/// What a sanitizer rule does with a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Remove the entire line.
    DropLine,
    /// Delete the matched text.
    Strip,
    /// Substitute the rule's `with` template (regex `$1` syntax allowed).
    Replace,
}

/// A declarative sanitizer rule, as written in `[[sanitizer.rules]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Short identifier reported when the rule fires.
    pub name: String,
    pub scope: RuleScope,
    /// Regular expression (`regex` crate syntax).
    pub pattern: String,
    pub action: RuleAction,
    /// Replacement template for [`RuleAction::Replace`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<String>,
}

impl RuleSpec {
    pub fn drop_line(name: &str, pattern: &str) -> Self {
        Self {
            name: name.into(),
            scope: RuleScope::Line,
            pattern: pattern.into(),
            action: RuleAction::DropLine,
            with: None,
        }
    }

    pub fn strip(name: &str, pattern: &str) -> Self {
        Self {
            name: name.into(),
            scope: RuleScope::Inline,
            pattern: pattern.into(),
            action: RuleAction::Strip,
            with: None,
        }
    }

    pub fn replace(name: &str, pattern: &str, with: &str) -> Self {
        Self {
            name: name.into(),
            scope: RuleScope::Inline,
            pattern: pattern.into(),
            action: RuleAction::Replace,
            with: Some(with.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_first_middle_last() {
        assert_eq!(SegmentRole::classify(1, 3), SegmentRole::Opening);
        assert_eq!(SegmentRole::classify(2, 3), SegmentRole::Interior);
        assert_eq!(SegmentRole::classify(3, 3), SegmentRole::Closing);
        assert_eq!(SegmentRole::classify(2, 2), SegmentRole::Closing);
    }

    #[test]
    fn classify_single_unit_is_opening() {
        assert_eq!(SegmentRole::classify(1, 1), SegmentRole::Opening);
    }

    #[test]
    fn classify_interior_range() {
        for i in 2..10 {
            assert_eq!(SegmentRole::classify(i, 10), SegmentRole::Interior);
        }
    }

    #[test]
    fn unit_role_delegates_to_classify() {
        let unit = GenerationUnit {
            section_label: "Intro".into(),
            instruction: "hook".into(),
            index: 4,
            total: 4,
        };
        assert_eq!(unit.role(), SegmentRole::Closing);
    }

    #[test]
    fn word_target_display() {
        assert_eq!(WordTarget::approx(500).to_string(), "approximately 500 words");
        assert_eq!(WordTarget::range(1200, 1500).to_string(), "1200-1500 words");
    }

    #[test]
    fn rule_spec_from_toml() {
        let spec: RuleSpec = toml::from_str(
            r#"
name = "stage-direction"
scope = "inline"
pattern = '\([^)]*\)'
action = "strip"
"#,
        )
        .expect("parse rule");
        assert_eq!(spec.scope, RuleScope::Inline);
        assert_eq!(spec.action, RuleAction::Strip);
        assert!(spec.with.is_none());
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&SegmentRole::Interior).unwrap();
        assert_eq!(json, r#""interior""#);
    }
}
