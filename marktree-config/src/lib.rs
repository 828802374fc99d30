//! Shared configuration loader for the marktree toolchain.
//!
//! `defaults/marktree.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files on top
//! of those defaults via [`Loader`] before deserializing into [`MarktreeConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use marktree::formats::markdown::{BreakStyle, HardBreakPolicy, LineEndingPolicy, MarkdownOptions};
use marktree::protocol::Limits;
use marktree::session::{AnchorSettings, SessionSettings};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../defaults/marktree.default.toml");

/// Name of the optional per-project override file.
pub const PROJECT_FILE: &str = "marktree.toml";

/// Top-level configuration consumed by marktree applications.
#[derive(Debug, Clone, Deserialize)]
pub struct MarktreeConfig {
    pub markdown: MarkdownConfig,
    pub protocol: ProtocolConfig,
    pub anchoring: AnchoringConfig,
}

/// Parser and serializer knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkdownConfig {
    pub preserve_line_breaks: bool,
    pub hard_break_style_on_save: HardBreakPolicy,
    pub default_hard_break_style: BreakStyle,
    pub line_ending_on_save: LineEndingPolicy,
    pub cjk_soft_break_join: bool,
    pub max_nesting_depth: usize,
}

impl From<&MarkdownConfig> for MarkdownOptions {
    fn from(config: &MarkdownConfig) -> Self {
        MarkdownOptions {
            preserve_line_breaks: config.preserve_line_breaks,
            hard_break_on_save: config.hard_break_style_on_save,
            default_hard_break: config.default_hard_break_style,
            line_ending_on_save: config.line_ending_on_save,
            cjk_soft_break_join: config.cjk_soft_break_join,
            max_nesting_depth: config.max_nesting_depth,
        }
    }
}

impl From<MarkdownConfig> for MarkdownOptions {
    fn from(config: MarkdownConfig) -> Self {
        MarkdownOptions::from(&config)
    }
}

/// Protocol server behavior and limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub auto_approve_edits: bool,
    pub max_batch_size: usize,
    pub max_payload_bytes: usize,
    pub max_requests_per_second: usize,
    pub max_concurrent_requests: usize,
    pub default_page_size: usize,
}

impl From<&ProtocolConfig> for Limits {
    fn from(config: &ProtocolConfig) -> Self {
        Limits {
            max_batch_size: config.max_batch_size,
            max_payload_bytes: config.max_payload_bytes,
            max_requests_per_second: config.max_requests_per_second,
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }
}

/// Tunables for anchored replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct AnchoringConfig {
    pub context_similarity_threshold: f64,
    pub max_distance: usize,
}

impl From<&AnchoringConfig> for AnchorSettings {
    fn from(config: &AnchoringConfig) -> Self {
        AnchorSettings {
            context_similarity_threshold: config.context_similarity_threshold,
            max_distance: config.max_distance,
        }
    }
}

impl From<&MarktreeConfig> for SessionSettings {
    fn from(config: &MarktreeConfig) -> Self {
        SessionSettings {
            markdown: (&config.markdown).into(),
            auto_approve_edits: config.protocol.auto_approve_edits,
            default_page_size: config.protocol.default_page_size,
            anchoring: (&config.anchoring).into(),
        }
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<MarktreeConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<MarktreeConfig, ConfigError> {
    Loader::new().build()
}
