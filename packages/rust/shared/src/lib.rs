//! Shared types, error model, and configuration for narrascript.
//!
//! This crate is the foundation depended on by all other narrascript crates.
//! It provides:
//! - [`NarrascriptError`] and [`GatewayError`], the error model
//! - Domain types ([`GenerationUnit`], [`SegmentRole`], [`WordTarget`], sanitizer rule specs)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContextConfig, ContextPolicyKind, DefaultsConfig, OpenRouterConfig, PromptConfig,
    RetryConfig, SanitizerConfig, WordTargets, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key,
};
pub use error::{GatewayError, NarrascriptError, Result};
pub use types::{GenerationUnit, RuleAction, RuleScope, RuleSpec, SegmentRole, WordTarget};
