//! Prompt composition from named rule blocks.
//!
//! Blocks are emitted in a fixed order, separated by blank lines:
//!
//! ```text
//! style → tone → integration → simplification → persona
//!   → [outline summary] → role block → section + instruction
//!   → [context excerpt] → word target → format → [suspense]
//! ```
//!
//! Early blocks anchor voice; later ones anchor the task at hand. The excerpt
//! is left out entirely when empty, which is what tells the backend it is
//! writing the very first segment.

use std::fmt::Write;

use narrascript_shared::{AppConfig, GenerationUnit, PromptConfig, SegmentRole, WordTargets};

// ---------------------------------------------------------------------------
// Built-in blocks
// ---------------------------------------------------------------------------

const STYLE: &str = "\
VOICEOVER REQUIREMENTS:
- Write only speakable content that flows naturally when read aloud.
- Pure conversational prose: no bullet points, headers or formatting.
- No stage directions, parenthetical notes or character labels.
- No meta-commentary about the script itself.
- Every sentence must be complete and speakable.
- Tell the story as a single narrator; no dialogue scenes between characters.";

const TONE: &str = "\
TONE:
- Sound like you are talking to a friend, not writing a novel.
- Use simple, everyday language (8th-grade level).
- Keep sentences short: 10-15 words on average.
- Use contractions naturally (don't, can't, here's, that's).
- Start sentences casually (So, Now, But, And, Here's).
- Address the listener directly as \"you\" now and then.";

const INTEGRATION: &str = "\
NATURAL INTEGRATION:
- Work facts and numbers into the story conversationally (\"Here's the thing...\", \"Get this...\").
- No formal introductions to data and no academic phrasing.
- Use transitions people actually say: \"So here's what happened\", \"But wait\".";

const SIMPLIFICATION: &str = "\
SIMPLIFICATION:
- No sentence longer than 20 words.
- No metaphors, poetic language or purple prose; say it plainly.
- Balance inner thoughts with physical actions: show, don't tell.
- Use active voice.";

const PERSONA: &str = "You are writing a continuous story script for a YouTube voiceover.";

const OPENING: &str = "\
This is the opening of the script.
- Start with an immediate hook: action or conflict, no scene-setting.
- Make the stakes clear early.";

const INTERIOR: &str = "\
This is a middle part of the script.
- Continue the story immediately from where the previous part ended.
- Keep the same characters, tone and events; the transition must feel seamless.";

const CLOSING: &str = "\
This is the final part of the script.
- Continue immediately from where the previous part ended.
- Wrap the story up naturally; do not introduce new subplots or major characters.
- Finish with a call to action that fits the story, not a generic \"please subscribe\".";

const FORMAT: &str = "\
OUTPUT FORMAT:
- Provide ONLY the narration, in plain text paragraphs.
- No titles, section headers, notes, explanations or any text outside the story.
- No formatting symbols (*, **, -, #, [], |).";

const CONTEXT_HEADING: &str = "The previous part ended exactly like this:";

const SUSPENSE: &str = "End this segment on the cliffhanger moment described in the outline point.";

/// The named text blocks a prompt is assembled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBlocks {
    pub style: String,
    pub tone: String,
    pub integration: String,
    pub simplification: String,
    pub persona: String,
    pub opening: String,
    pub interior: String,
    pub closing: String,
    pub format: String,
    /// Line introducing the context excerpt.
    pub context_heading: String,
    /// Substring of an instruction that asks for a suspense ending.
    pub suspense_marker: String,
    pub suspense_instruction: String,
}

impl Default for RuleBlocks {
    fn default() -> Self {
        Self {
            style: STYLE.into(),
            tone: TONE.into(),
            integration: INTEGRATION.into(),
            simplification: SIMPLIFICATION.into(),
            persona: PERSONA.into(),
            opening: OPENING.into(),
            interior: INTERIOR.into(),
            closing: CLOSING.into(),
            format: FORMAT.into(),
            context_heading: CONTEXT_HEADING.into(),
            suspense_marker: "Cliffhanger:".into(),
            suspense_instruction: SUSPENSE.into(),
        }
    }
}

impl RuleBlocks {
    /// Built-in blocks with any `[prompt]` overrides applied.
    pub fn with_overrides(config: &PromptConfig) -> Self {
        let mut blocks = Self::default();
        let overrides = [
            (&mut blocks.style, &config.style),
            (&mut blocks.tone, &config.tone),
            (&mut blocks.integration, &config.integration),
            (&mut blocks.simplification, &config.simplification),
            (&mut blocks.persona, &config.persona),
            (&mut blocks.opening, &config.opening),
            (&mut blocks.interior, &config.interior),
            (&mut blocks.closing, &config.closing),
            (&mut blocks.format, &config.format),
            (&mut blocks.context_heading, &config.context_heading),
            (&mut blocks.suspense_instruction, &config.suspense_instruction),
        ];
        for (slot, value) in overrides {
            if let Some(text) = value {
                *slot = text.clone();
            }
        }
        blocks.suspense_marker = config.suspense_marker.clone();
        blocks
    }

    pub fn role_block(&self, role: SegmentRole) -> &str {
        match role {
            SegmentRole::Opening => &self.opening,
            SegmentRole::Interior => &self.interior,
            SegmentRole::Closing => &self.closing,
        }
    }
}

// ---------------------------------------------------------------------------
// PromptComposer
// ---------------------------------------------------------------------------

/// Builds one prompt per unit. Holds no per-run state.
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    blocks: RuleBlocks,
    word_targets: WordTargets,
    avoided_phrases: Vec<String>,
    outline_summary: Option<String>,
}

impl PromptComposer {
    pub fn new(blocks: RuleBlocks, word_targets: WordTargets) -> Self {
        Self {
            blocks,
            word_targets,
            avoided_phrases: Vec::new(),
            outline_summary: None,
        }
    }

    /// Composer for the `[prompt]` section, avoiding the sanitizer's phrase list.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            RuleBlocks::with_overrides(&config.prompt),
            config.prompt.word_targets,
        )
        .with_avoided_phrases(config.sanitizer.disallowed_phrases.clone())
    }

    /// Ask the backend not to use these words in the first place.
    pub fn with_avoided_phrases(mut self, phrases: Vec<String>) -> Self {
        self.avoided_phrases = phrases;
        self
    }

    /// Give every prompt a numbered list of all outline points.
    pub fn with_outline_summary(mut self, units: &[GenerationUnit]) -> Self {
        self.outline_summary = Some(outline_summary(units));
        self
    }

    /// Compose the prompt for `unit` given the context excerpt (possibly empty).
    pub fn compose(&self, unit: &GenerationUnit, context: &str) -> String {
        let role = unit.role();
        let mut parts: Vec<String> = vec![
            self.blocks.style.clone(),
            self.blocks.tone.clone(),
            self.blocks.integration.clone(),
            self.blocks.simplification.clone(),
            self.blocks.persona.clone(),
        ];

        if let Some(summary) = &self.outline_summary {
            parts.push(summary.clone());
        }

        parts.push(self.blocks.role_block(role).to_string());
        parts.push(instruction_block(unit));

        let context = context.trim();
        if !context.is_empty() {
            parts.push(format!("{}\n\"{context}\"", self.blocks.context_heading));
        }

        parts.push(format!(
            "Write {} for this part.",
            self.word_targets.for_role(role)
        ));
        parts.push(self.format_block());

        if !self.blocks.suspense_marker.is_empty()
            && unit.instruction.contains(&self.blocks.suspense_marker)
        {
            parts.push(self.blocks.suspense_instruction.clone());
        }

        parts.retain(|p| !p.trim().is_empty());
        parts.join("\n\n")
    }

    fn format_block(&self) -> String {
        if self.avoided_phrases.is_empty() {
            return self.blocks.format.clone();
        }
        format!(
            "{}\n- Do not use these words or phrases: {}.",
            self.blocks.format,
            self.avoided_phrases.join(", ")
        )
    }
}

fn instruction_block(unit: &GenerationUnit) -> String {
    let mut block = String::new();
    if !unit.section_label.is_empty() {
        let _ = writeln!(block, "Current section: \"{}\"", unit.section_label);
    }
    let _ = write!(
        block,
        "Outline point to develop ({} of {}): \"{}\"",
        unit.index, unit.total, unit.instruction
    );
    block
}

/// Numbered list of every unit instruction, grouped under section labels.
pub fn outline_summary(units: &[GenerationUnit]) -> String {
    let mut summary = String::from("FULL OUTLINE (for orientation; write only the current point):");
    let mut section: Option<&str> = None;

    for unit in units {
        if !unit.section_label.is_empty() && section != Some(unit.section_label.as_str()) {
            let _ = write!(summary, "\n{}", unit.section_label);
            section = Some(unit.section_label.as_str());
        }
        let _ = write!(summary, "\n{}. {}", unit.index, unit.instruction);
    }
    summary
}
