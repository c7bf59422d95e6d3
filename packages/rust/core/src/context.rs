//! Continuity context handed from one unit to the next.

use std::sync::LazyLock;

use regex::Regex;

use narrascript_shared::{ContextConfig, ContextPolicyKind};

/// Sentence-ending punctuation followed by whitespace.
static SENTENCE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence break regex"));

/// How much of the script so far is shown to the next unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPolicy {
    /// The last `sentences` sentences, joined by single spaces.
    Trailing { sentences: usize },
    /// The whole script so far.
    Full,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self::Trailing { sentences: 2 }
    }
}

impl ContextPolicy {
    pub fn from_config(config: &ContextConfig) -> Self {
        match config.policy {
            ContextPolicyKind::Trailing => Self::Trailing {
                sentences: config.sentences,
            },
            ContextPolicyKind::Full => Self::Full,
        }
    }

    /// Excerpt of `script` under this policy; empty when there is nothing to show.
    pub fn excerpt(&self, script: &str) -> String {
        match *self {
            Self::Trailing { sentences } => trailing_sentences(script, sentences),
            Self::Full => script.trim().to_string(),
        }
    }
}

/// The last `n` sentences of `text`, joined by single spaces.
///
/// Splits after `.`, `!` or `?` followed by whitespace. Abbreviations get
/// split too; the excerpt is only a continuity cue.
pub fn trailing_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    if text.is_empty() || n == 0 {
        return String::new();
    }

    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK_RE.find_iter(text) {
        // Keep the punctuation, drop the whitespace.
        let end = m.start() + 1;
        sentences.push(text[start..end].trim());
        start = m.end();
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());

    let skip = sentences.len().saturating_sub(n);
    sentences[skip..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_two_sentences() {
        assert_eq!(trailing_sentences("A. B! C?", 2), "B! C?");
    }

    #[test]
    fn empty_script_gives_empty_excerpt() {
        assert_eq!(trailing_sentences("", 2), "");
        assert_eq!(trailing_sentences("   \n", 2), "");
    }

    #[test]
    fn zero_sentences_gives_empty_excerpt() {
        assert_eq!(trailing_sentences("A. B.", 0), "");
    }

    #[test]
    fn fewer_sentences_than_requested() {
        assert_eq!(trailing_sentences("Only one here.", 3), "Only one here.");
    }

    #[test]
    fn paragraph_breaks_are_sentence_breaks() {
        let script = "First para ends.\n\nSecond starts. And ends!";
        assert_eq!(trailing_sentences(script, 2), "Second starts. And ends!");
        assert_eq!(
            trailing_sentences(script, 3),
            "First para ends. Second starts. And ends!"
        );
    }

    #[test]
    fn unterminated_tail_counts_as_sentence() {
        assert_eq!(trailing_sentences("Done. Then she", 1), "Then she");
    }

    #[test]
    fn full_policy_returns_everything() {
        let script = "A. B.\n\nC.";
        assert_eq!(ContextPolicy::Full.excerpt(script), script);
        assert_eq!(ContextPolicy::Full.excerpt(""), "");
    }

    #[test]
    fn policy_from_config() {
        let mut config = ContextConfig::default();
        assert_eq!(
            ContextPolicy::from_config(&config),
            ContextPolicy::Trailing { sentences: 2 }
        );
        config.policy = ContextPolicyKind::Full;
        assert_eq!(ContextPolicy::from_config(&config), ContextPolicy::Full);
    }
}
