//! Outline parser.
//!
//! Turns an outline into the ordered list of [`GenerationUnit`]s the pipeline
//! expands one by one. Two shapes are accepted:
//! - Hierarchical: `### Section Title` headings followed by `- point` bullets.
//!   Each bullet is one unit labelled with the heading above it.
//! - Flat: one point per non-blank line, no section labels.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use narrascript_shared::{GenerationUnit, NarrascriptError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The outline shapes the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineForm {
    /// `### Section` headings and `- point` bullets.
    Hierarchical,
    /// One point per line.
    Flat,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `### Section Title` (any heading depth). The hashes must be
/// followed by whitespace, so `#1 point` or `#tag` is not a heading.
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,6}(?:\s+(.*))?$").expect("section regex")
});

/// Matches a trailing word-count annotation such as `(1,500 words)` or `(800-900 words)`.
static WORD_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(\s*~?\d[\d,]*(?:\s*[-–]\s*\d[\d,]*)?\s+words?\s*\)\s*$")
        .expect("word count regex")
});

/// Matches `- point`, `* point` or `• point`.
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:-|•|\*\s)\s*(.*)$").expect("bullet regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an outline, detecting its shape first.
///
/// Fails when no unit can be extracted: an empty run is never valid.
#[instrument(skip_all, fields(len = text.len()))]
pub fn parse_outline(text: &str) -> Result<Vec<GenerationUnit>> {
    let form = detect_form(text);
    debug!(?form, "outline form detected");
    parse_outline_as(text, form)
}

/// Parse an outline in a known shape.
pub fn parse_outline_as(text: &str, form: OutlineForm) -> Result<Vec<GenerationUnit>> {
    let points = match form {
        OutlineForm::Hierarchical => collect_hierarchical(text),
        OutlineForm::Flat => collect_flat(text),
    };

    if points.is_empty() {
        return Err(NarrascriptError::outline(match form {
            OutlineForm::Hierarchical => {
                "no bullet points found; use '### Section' headings and '- point' lines"
            }
            OutlineForm::Flat => "outline is empty",
        }));
    }

    let total = points.len();
    let units = points
        .into_iter()
        .enumerate()
        .map(|(i, (section_label, instruction))| GenerationUnit {
            section_label,
            instruction,
            index: i + 1,
            total,
        })
        .collect();

    Ok(units)
}

/// Decide which shape an outline uses.
///
/// Any heading or bullet line makes the whole outline hierarchical; stray
/// prose lines in a hierarchical outline are then ignored.
pub fn detect_form(text: &str) -> OutlineForm {
    let hierarchical = text.lines().map(str::trim).any(|line| {
        (line.starts_with('#') && SECTION_RE.is_match(line)) || bullet_text(line).is_some()
    });

    if hierarchical {
        OutlineForm::Hierarchical
    } else {
        OutlineForm::Flat
    }
}

/// Undo the literal `\n` escapes an outline picks up when passed through a
/// single-line environment variable.
pub fn normalize_escaped_newlines(text: &str) -> String {
    if text.contains('\n') || !text.contains("\\n") {
        return text.to_string();
    }
    text.replace("\\r\\n", "\n").replace("\\n", "\n")
}

fn collect_hierarchical(text: &str) -> Vec<(String, String)> {
    let mut points = Vec::new();
    // Bullets before the first heading carry no section.
    let mut current_section = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('#') {
            if let Some(caps) = SECTION_RE.captures(trimmed) {
                current_section = section_title(caps.get(1).map_or("", |m| m.as_str()));
                continue;
            }
        }

        if let Some(instruction) = bullet_text(trimmed) {
            points.push((current_section.clone(), instruction.to_string()));
        }

        // Anything else is stray prose.
    }

    points
}

fn collect_flat(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (String::new(), line.to_string()))
        .collect()
}

/// Strip the word-count annotation from a heading title.
fn section_title(raw: &str) -> String {
    WORD_COUNT_RE.replace(raw.trim(), "").trim().to_string()
}

/// Bullet text without its marker, if the line is a bullet with real content.
///
/// Rules such as `---` look like bullets but carry no words.
fn bullet_text(line: &str) -> Option<&str> {
    let caps = BULLET_RE.captures(line)?;
    let text = caps.get(1)?.as_str().trim();
    text.chars().any(char::is_alphanumeric).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hierarchical_fixture() {
        let content = std::fs::read_to_string("../../../fixtures/outlines/hierarchical.md")
            .expect("read fixture");
        let units = parse_outline(&content).unwrap();

        assert_eq!(units.len(), 6);
        assert!(units.iter().all(|u| u.total == 6));
        let indexes: Vec<usize> = units.iter().map(|u| u.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5, 6]);

        assert_eq!(units[0].section_label, "Act One: The Leak");
        assert_eq!(
            units[0].instruction,
            "Elena finds the falsified safety report on a shared drive"
        );
        assert_eq!(units[2].section_label, "Act Two: Pushback");
        assert_eq!(
            units[4].instruction,
            "Cliffhanger: a car follows her home from the office"
        );
        assert_eq!(units[5].section_label, "Act Three: Fallout");
    }

    #[test]
    fn parse_flat_fixture() {
        let content =
            std::fs::read_to_string("../../../fixtures/outlines/flat.txt").expect("read fixture");
        let units = parse_outline(&content).unwrap();

        assert_eq!(units.len(), 4);
        assert!(units.iter().all(|u| u.section_label.is_empty()));
        assert_eq!(
            units[1].instruction,
            "She asks one question in a meeting and the room goes quiet."
        );
        assert_eq!(units[3].index, 4);
    }

    #[test]
    fn bullets_keep_source_order_across_sections() {
        let text = "### A\n- one\n- two\n### B\n- three\n### C\n### D\n- four\n";
        let units = parse_outline(text).unwrap();
        let got: Vec<(&str, &str)> = units
            .iter()
            .map(|u| (u.section_label.as_str(), u.instruction.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("A", "one"), ("A", "two"), ("B", "three"), ("D", "four")]
        );
    }

    #[test]
    fn bullets_before_any_heading_have_empty_section() {
        let units = parse_outline("- opening beat\n### Later\n- next beat").unwrap();
        assert_eq!(units[0].section_label, "");
        assert_eq!(units[1].section_label, "Later");
    }

    #[test]
    fn word_count_annotations_stripped() {
        assert_eq!(section_title(" Intro (1,200 words)"), "Intro");
        assert_eq!(section_title("Intro (500 words)"), "Intro");
        assert_eq!(section_title("Intro (800-900 words)"), "Intro");
        assert_eq!(section_title("Intro (the beginning)"), "Intro (the beginning)");
    }

    #[test]
    fn bullet_marker_variants() {
        assert_eq!(bullet_text("- hook"), Some("hook"));
        assert_eq!(bullet_text("-hook"), Some("hook"));
        assert_eq!(bullet_text("* reveal"), Some("reveal"));
        assert_eq!(bullet_text("• twist"), Some("twist"));
        assert_eq!(bullet_text("---"), None);
        assert_eq!(bullet_text("**bold**"), None);
    }

    #[test]
    fn headings_only_fails() {
        let result = parse_outline("### Intro\n### Outro\n\nsome stray text\n");
        assert!(matches!(result, Err(NarrascriptError::OutlineParse { .. })));
    }

    #[test]
    fn blank_outline_fails() {
        assert!(parse_outline("").is_err());
        assert!(parse_outline("   \n\n\t\n").is_err());
    }

    #[test]
    fn detect_form_variants() {
        assert_eq!(detect_form("### Intro\n- hook"), OutlineForm::Hierarchical);
        assert_eq!(detect_form("- hook\n- reveal"), OutlineForm::Hierarchical);
        assert_eq!(detect_form("hook\nreveal"), OutlineForm::Flat);
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        let text = "#1 Elena finds the report\n#2 She confronts the CEO\n";
        assert_eq!(detect_form(text), OutlineForm::Flat);

        let units = parse_outline(text).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].instruction, "#1 Elena finds the report");
        assert_eq!(units[1].section_label, "");
    }

    #[test]
    fn hashtag_line_in_hierarchical_outline_is_prose() {
        let units = parse_outline("### Intro\n- hook\n#context\n- reveal").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].section_label, "Intro");
    }

    #[test]
    fn bare_heading_clears_section() {
        let units = parse_outline("### Intro\n- hook\n#\n- reveal").unwrap();
        assert_eq!(units[1].section_label, "");
    }

    #[test]
    fn flat_form_forced_keeps_marker_lines() {
        let units = parse_outline_as("### Intro\n- hook", OutlineForm::Flat).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].instruction, "### Intro");
    }

    #[test]
    fn escaped_newlines_normalized() {
        assert_eq!(normalize_escaped_newlines("a\\nb\\nc"), "a\nb\nc");
        // Real newlines present: leave literal backslashes alone.
        assert_eq!(normalize_escaped_newlines("a\\n\nb"), "a\\n\nb");
    }
}
