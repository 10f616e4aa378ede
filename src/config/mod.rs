//! Consumer configuration
//!
//! Loaded from `crossabi.toml` (current directory or any parent), then
//! overridden by `CROSSABI_*` environment variables.
//!
//! ```toml
//! producer = "raw"
//! traversal_depth_limit = 16
//!
//! [log]
//! level = "debug"
//! json = true
//! file = "logs/crossabi.log"
//! ```

use crate::envelope::MAX_ENVELOPE_DEPTH;
use crate::errors::{AbiError, AbiResult};
use crate::logging::{parse_level, LogConfig};
use crate::producer::ProducerKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "crossabi.toml";

/// Upper bound accepted for `traversal_depth_limit`
pub const MAX_TRAVERSAL_DEPTH_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiConfig {
    /// Producer the consumer binds to
    #[serde(default)]
    pub producer: ProducerKind,

    /// Deepest envelope nesting a consumer will traverse
    #[serde(default = "default_depth_limit")]
    pub traversal_depth_limit: usize,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default = "default_false")]
    pub spans: bool,

    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self {
            producer: ProducerKind::default(),
            traversal_depth_limit: default_depth_limit(),
            log: LogSection::default(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            spans: false,
            file: None,
        }
    }
}

fn default_depth_limit() -> usize { MAX_ENVELOPE_DEPTH }
fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }

impl AbiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> AbiResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AbiError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> AbiResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Find `crossabi.toml` in the current directory or its parents
    pub fn discover() -> AbiResult<Self> {
        let mut current = std::env::current_dir().ok();
        while let Some(dir) = current {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.is_file() {
                return Self::load(&path);
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        Ok(Self::default())
    }

    /// Discovered file plus environment overrides
    pub fn from_env() -> AbiResult<Self> {
        let mut config = Self::discover()?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `CROSSABI_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AbiResult<()> {
        if let Some(producer) = lookup("CROSSABI_PRODUCER") {
            self.producer = producer.parse()?;
        }
        if let Some(limit) = lookup("CROSSABI_DEPTH_LIMIT") {
            self.traversal_depth_limit = limit
                .trim()
                .parse()
                .map_err(|_| AbiError::Config(format!("CROSSABI_DEPTH_LIMIT is not a number: {limit}")))?;
        }
        if let Some(level) = lookup("CROSSABI_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file) = lookup("CROSSABI_LOG_FILE") {
            self.log.file = Some(PathBuf::from(file));
        }
        self.validate()
    }

    pub fn validate(&self) -> AbiResult<()> {
        if self.traversal_depth_limit == 0 || self.traversal_depth_limit > MAX_TRAVERSAL_DEPTH_LIMIT {
            return Err(AbiError::Config(format!(
                "traversal_depth_limit must be in 1..={MAX_TRAVERSAL_DEPTH_LIMIT}, got {}",
                self.traversal_depth_limit
            )));
        }
        if parse_level(&self.log.level).is_none() {
            return Err(AbiError::Config(format!("unknown log level `{}`", self.log.level)));
        }
        Ok(())
    }

    /// Logging setup described by the `[log]` section
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.log.level).unwrap_or(crate::logging::Level::INFO),
            file_output: self.log.file.is_some(),
            log_path: self.log.file.clone(),
            json_format: self.log.json,
            show_spans: self.log.spans,
        }
    }
}
