//! Loop configuration stored in `fixloop.toml`.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fixloop.toml";

/// Loop configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the reference
/// deployment (Groq-hosted Llama, Python, 5 second timeout, 3 attempts).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FixloopConfig {
    /// Maximum number of generation attempts per run.
    pub max_iterations: u32,

    pub model: ModelConfig,

    pub sandbox: SandboxConfig,
}

/// Language-model backend settings (any OpenAI-compatible chat completions API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Program execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter invocation; the program text is appended as the final argument.
    pub command: Vec<String>,
    /// Language named in the prompt (must match what `command` runs).
    pub language: String,
    /// Wall-clock limit for one program run, in seconds.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for FixloopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            model: ModelConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.0,
            api_key_env: "GROQ_API_KEY".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "-c".to_string()],
            language: "Python".to_string(),
            timeout_secs: 5,
            output_limit_bytes: 100_000,
        }
    }
}

impl FixloopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must not be empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!("model.temperature must be within 0.0..=2.0"));
        }
        if self.model.api_key_env.trim().is_empty() {
            return Err(anyhow!("model.api_key_env must not be empty"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.sandbox.command.is_empty() || self.sandbox.command[0].trim().is_empty() {
            return Err(anyhow!("sandbox.command must be a non-empty array"));
        }
        if self.sandbox.language.trim().is_empty() {
            return Err(anyhow!("sandbox.language must not be empty"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Command-line overrides applied on top of the file config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_iterations: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub model: Option<String>,
}

/// Apply overrides to the base config and validate the result.
pub fn apply_overrides(mut base: FixloopConfig, overrides: &ConfigOverrides) -> Result<FixloopConfig> {
    if let Some(max_iterations) = overrides.max_iterations {
        base.max_iterations = max_iterations;
    }
    if let Some(timeout_secs) = overrides.timeout_secs {
        base.sandbox.timeout_secs = timeout_secs;
    }
    if let Some(model) = &overrides.model {
        base.model.model = model.clone();
    }
    base.validate()?;
    Ok(base)
}

/// Read the API key from the environment variable named in the model config.
pub fn resolve_api_key(model: &ModelConfig) -> Result<String> {
    let key = env::var(&model.api_key_env)
        .with_context(|| format!("read API key from ${}", model.api_key_env))?;
    if key.trim().is_empty() {
        return Err(anyhow!("${} is set but empty", model.api_key_env));
    }
    Ok(key)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FixloopConfig::default()`.
pub fn load_config(path: &Path) -> Result<FixloopConfig> {
    if !path.exists() {
        let cfg = FixloopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
