//! Application configuration for narrascript.
//!
//! User config lives at `~/.narrascript/narrascript.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NarrascriptError, Result};
use crate::types::{RuleSpec, SegmentRole, WordTarget};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "narrascript.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".narrascript";

// ---------------------------------------------------------------------------
// Config structs (matching narrascript.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Retry decorator around the gateway.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Continuity context handed to each unit.
    #[serde(default)]
    pub context: ContextConfig,

    /// Prompt rule-block overrides and length targets.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Output sanitizer rules and tables.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where the finished script is written.
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Pause after each appended segment, as a rate-limit courtesy.
    #[serde(default = "default_inter_unit_delay")]
    pub inter_unit_delay_ms: u64,

    /// Persist the partial script when a run halts.
    #[serde(default)]
    pub save_partial: bool,

    /// Write the `<output>.run.json` sidecar.
    #[serde(default = "default_true")]
    pub write_report: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            inter_unit_delay_ms: default_inter_unit_delay(),
            save_partial: false,
            write_report: true,
        }
    }
}

fn default_output_file() -> String {
    "generated_story.txt".into()
}
fn default_inter_unit_delay() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model to request completions from.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Chat-completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent as `HTTP-Referer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Sent as `X-Title`.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            referer: None,
            title: default_title(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "nvidia/llama-3.3-nemotron-super-49b-v1:free".into()
}
fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_title() -> String {
    "narrascript".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per unit, including the first. 1 disables retrying.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each one after.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}
fn default_initial_backoff() -> u64 {
    1000
}

/// How much earlier output is handed to the next unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicyKind {
    /// The last `sentences` sentences only; prompt size stays flat.
    #[default]
    Trailing,
    /// The entire script so far; prompt size grows with every unit.
    Full,
}

/// `[context]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub policy: ContextPolicyKind,

    /// Sentence count for the trailing policy.
    #[serde(default = "default_context_sentences")]
    pub sentences: usize,

    /// Add a numbered list of every outline point to each prompt.
    #[serde(default)]
    pub include_outline_summary: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            policy: ContextPolicyKind::default(),
            sentences: default_context_sentences(),
            include_outline_summary: false,
        }
    }
}

fn default_context_sentences() -> usize {
    2
}

/// `[prompt]` section.
///
/// Every block is optional; an absent block falls back to the built-in text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_heading: Option<String>,

    /// Token in a unit instruction that asks for a suspense ending.
    #[serde(default = "default_suspense_marker")]
    pub suspense_marker: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspense_instruction: Option<String>,

    #[serde(default)]
    pub word_targets: WordTargets,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            style: None,
            tone: None,
            integration: None,
            simplification: None,
            persona: None,
            opening: None,
            interior: None,
            closing: None,
            format: None,
            context_heading: None,
            suspense_marker: default_suspense_marker(),
            suspense_instruction: None,
            word_targets: WordTargets::default(),
        }
    }
}

fn default_suspense_marker() -> String {
    "Cliffhanger:".into()
}

/// `[prompt.word_targets]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTargets {
    #[serde(default = "default_word_target")]
    pub opening: WordTarget,
    #[serde(default = "default_word_target")]
    pub interior: WordTarget,
    #[serde(default = "default_word_target")]
    pub closing: WordTarget,
}

impl WordTargets {
    /// Same target for every role.
    pub fn uniform(target: WordTarget) -> Self {
        Self {
            opening: target,
            interior: target,
            closing: target,
        }
    }

    pub fn for_role(&self, role: SegmentRole) -> WordTarget {
        match role {
            SegmentRole::Opening => self.opening,
            SegmentRole::Interior => self.interior,
            SegmentRole::Closing => self.closing,
        }
    }
}

impl Default for WordTargets {
    fn default() -> Self {
        Self::uniform(default_word_target())
    }
}

fn default_word_target() -> WordTarget {
    WordTarget::approx(500)
}

/// `[sanitizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Phrases removed wherever they occur as whole words.
    #[serde(default = "default_disallowed_phrases")]
    pub disallowed_phrases: Vec<String>,

    /// Start from the built-in structural rule set.
    #[serde(default = "default_true")]
    pub use_default_rules: bool,

    /// Rules applied after the built-in set (or alone, if it is disabled).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSpec>,

    /// Formal word -> casual word.
    #[serde(default = "default_casual_words")]
    pub casual_words: BTreeMap<String, String>,

    /// Formal phrasing -> contraction.
    #[serde(default = "default_contractions")]
    pub contractions: BTreeMap<String, String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            disallowed_phrases: default_disallowed_phrases(),
            use_default_rules: true,
            rules: Vec::new(),
            casual_words: default_casual_words(),
            contractions: default_contractions(),
        }
    }
}

fn default_disallowed_phrases() -> Vec<String> {
    [
        "like",
        "we delve into",
        "unlock the secrets",
        "join us on a journey",
        "deep",
        "dive",
        "embark",
        "journey",
        "discover",
        "explore",
        "picture this",
        "unravel",
        "embrace",
        "get ready",
        "realm",
        "let's dive in",
        "imagine",
        "unravel the secrets",
        "in this realm",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_casual_words() -> BTreeMap<String, String> {
    [
        ("utilize", "use"),
        ("facilitate", "help"),
        ("commence", "start"),
        ("endeavor", "try"),
        ("purchase", "buy"),
        ("approximately", "about"),
        ("subsequently", "later"),
        ("demonstrate", "show"),
        ("numerous", "many"),
        ("assist", "help"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_contractions() -> BTreeMap<String, String> {
    [
        ("do not", "don't"),
        ("does not", "doesn't"),
        ("did not", "didn't"),
        ("cannot", "can't"),
        ("can not", "can't"),
        ("will not", "won't"),
        ("would not", "wouldn't"),
        ("is not", "isn't"),
        ("are not", "aren't"),
        ("was not", "wasn't"),
        ("it is", "it's"),
        ("that is", "that's"),
        ("there is", "there's"),
        ("here is", "here's"),
        ("you are", "you're"),
        ("they are", "they're"),
        ("we are", "we're"),
        ("i am", "I'm"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.narrascript/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NarrascriptError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.narrascript/narrascript.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NarrascriptError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        NarrascriptError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    validate(&config)?;
    Ok(config)
}

/// Reject values that parse but cannot work.
fn validate(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.openrouter.endpoint).map_err(|e| {
        NarrascriptError::config(format!(
            "openrouter.endpoint '{}' is not a valid URL: {e}",
            config.openrouter.endpoint
        ))
    })?;

    if config.openrouter.timeout_secs == 0 {
        return Err(NarrascriptError::config(
            "openrouter.timeout_secs must be greater than zero",
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(NarrascriptError::config(
            "retry.max_attempts must be at least 1",
        ));
    }

    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NarrascriptError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NarrascriptError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NarrascriptError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(NarrascriptError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
