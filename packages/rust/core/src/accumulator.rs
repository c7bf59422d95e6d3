//! The growing script.

/// Separator between consecutive segments.
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Ordered concatenation of sanitized segments.
///
/// Only the pipeline loop appends; context excerpts read [`current`](Self::current).
#[derive(Debug, Default, Clone)]
pub struct ScriptAccumulator {
    script: String,
    appended: usize,
}

impl ScriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment, preceded by a blank line unless it is the first.
    ///
    /// Empty segments are legal and still count as appended.
    pub fn append(&mut self, segment: &str) {
        if self.appended > 0 {
            self.script.push_str(SEGMENT_SEPARATOR);
        }
        self.script.push_str(segment);
        self.appended += 1;
    }

    /// The script so far.
    pub fn current(&self) -> &str {
        &self.script
    }

    /// Number of segments appended.
    pub fn len(&self) -> usize {
        self.appended
    }

    pub fn is_empty(&self) -> bool {
        self.appended == 0
    }

    /// The trimmed final document.
    pub fn finalize(self) -> String {
        self.script.trim().to_string()
    }
}
