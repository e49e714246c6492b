use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::DEFAULT_BUSY_MARKER;
use crate::dispatch::DEFAULT_CONFIRM_KEY;
use crate::llm::LlmSettings;
use crate::pilot::PilotConfig;
use crate::prompt::{DEFAULT_CONTINUATION, DEFAULT_PREAMBLE};

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".autopilot";

/// Environment variable overriding `pilot.interval_secs`.
pub const INTERVAL_ENV: &str = "AUTOPILOT_INTERVAL";

fn default_interval_secs() -> f64 {
    5.0
}

fn default_busy_backoff_secs() -> f64 {
    1.0
}

fn default_read_retry_secs() -> f64 {
    5.0
}

fn default_model() -> String {
    "gemma3:4b".to_string()
}

fn default_chat_url() -> String {
    "http://localhost:11434/api/chat".to_string()
}

fn default_openai_url() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_generate_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_timeout_backoff_secs() -> u64 {
    10
}

fn default_title_pattern() -> String {
    ".*Cursor.*".to_string()
}

fn default_busy_marker() -> String {
    DEFAULT_BUSY_MARKER.to_string()
}

fn default_confirm_key() -> String {
    DEFAULT_CONFIRM_KEY.to_string()
}

fn default_document() -> PathBuf {
    PathBuf::from("readme.md")
}

fn default_continuation() -> String {
    DEFAULT_CONTINUATION.to_string()
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

/// Loop cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PilotSection {
    /// Pause after each query cycle.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Pause while the assistant reports itself busy.
    #[serde(default = "default_busy_backoff_secs")]
    pub busy_backoff_secs: f64,
    /// Pause after the window text could not be read.
    #[serde(default = "default_read_retry_secs")]
    pub read_retry_secs: f64,
}

impl Default for PilotSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            busy_backoff_secs: default_busy_backoff_secs(),
            read_retry_secs: default_read_retry_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
    #[serde(default = "default_openai_url")]
    pub openai_url: String,
    #[serde(default = "default_generate_url")]
    pub generate_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout_backoff_secs")]
    pub timeout_backoff_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            chat_url: default_chat_url(),
            openai_url: default_openai_url(),
            generate_url: default_generate_url(),
            timeout_secs: default_timeout_secs(),
            timeout_backoff_secs: default_timeout_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowSection {
    /// Regex matched against window titles during discovery.
    #[serde(default = "default_title_pattern")]
    pub title_pattern: String,
    #[serde(default = "default_busy_marker")]
    pub busy_marker: String,
    #[serde(default = "default_confirm_key")]
    pub confirm_key: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title_pattern: default_title_pattern(),
            busy_marker: default_busy_marker(),
            confirm_key: default_confirm_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptSection {
    /// Document appended verbatim to the system instructions.
    #[serde(default = "default_document")]
    pub document: PathBuf,
    /// Directive sent when the assistant is idle.
    #[serde(default = "default_continuation")]
    pub continuation: String,
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            document: default_document(),
            continuation: default_continuation(),
            preamble: default_preamble(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub pilot: PilotSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub prompt: PromptSection,
}

impl ProjectConfig {
    /// Search upward from `start` for a `.autopilot/config.toml` file and load it.
    /// Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: ProjectConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((ProjectConfig::default(), None))
        }
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(INTERVAL_ENV) {
            self.pilot.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{INTERVAL_ENV} must be a number of seconds, got '{raw}'"))?;
        }
        Ok(())
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("pilot.interval_secs", self.pilot.interval_secs),
            ("pilot.busy_backoff_secs", self.pilot.busy_backoff_secs),
            ("pilot.read_retry_secs", self.pilot.read_retry_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a non-negative number of seconds, got {value}");
            }
        }
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be greater than zero");
        }
        if self.window.confirm_key.trim().is_empty() {
            bail!("window.confirm_key must not be empty");
        }
        regex::Regex::new(&self.window.title_pattern).with_context(|| {
            format!(
                "window.title_pattern is not a valid regex: {}",
                self.window.title_pattern
            )
        })?;
        Ok(())
    }

    /// Resolve the loop configuration. `system_prompt` is the preamble with
    /// the startup document already appended.
    pub fn pilot_config(&self, system_prompt: String) -> Result<PilotConfig> {
        let secs = |name: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .with_context(|| format!("{name} is not a valid duration: {value}"))
        };
        Ok(PilotConfig {
            title_pattern: regex::Regex::new(&self.window.title_pattern).with_context(|| {
                format!(
                    "window.title_pattern is not a valid regex: {}",
                    self.window.title_pattern
                )
            })?,
            system_prompt,
            continuation: self.prompt.continuation.clone(),
            busy_marker: self.window.busy_marker.clone(),
            confirm_key: self.window.confirm_key.clone(),
            interval: secs("pilot.interval_secs", self.pilot.interval_secs)?,
            busy_backoff: secs("pilot.busy_backoff_secs", self.pilot.busy_backoff_secs)?,
            read_retry: secs("pilot.read_retry_secs", self.pilot.read_retry_secs)?,
        })
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            model: self.llm.model.clone(),
            chat_url: self.llm.chat_url.clone(),
            openai_url: self.llm.openai_url.clone(),
            generate_url: self.llm.generate_url.clone(),
            timeout: Duration::from_secs(self.llm.timeout_secs),
            timeout_backoff: Duration::from_secs(self.llm.timeout_backoff_secs),
        }
    }
}

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .autopilot/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<22} {value}\n"));
}

/// Grouped, human-readable view of the effective configuration.
pub fn render_human(config: &ProjectConfig, config_path: Option<&Path>) -> String {
    let mut output = String::new();
    output.push_str("Pilot\n");
    push_kv(&mut output, "interval", format!("{}s", config.pilot.interval_secs));
    push_kv(
        &mut output,
        "busy_backoff",
        format!("{}s", config.pilot.busy_backoff_secs),
    );
    push_kv(
        &mut output,
        "read_retry",
        format!("{}s", config.pilot.read_retry_secs),
    );
    output.push('\n');

    output.push_str("LLM\n");
    push_kv(&mut output, "model", &config.llm.model);
    push_kv(&mut output, "chat_url", &config.llm.chat_url);
    push_kv(&mut output, "openai_url", &config.llm.openai_url);
    push_kv(&mut output, "generate_url", &config.llm.generate_url);
    push_kv(&mut output, "timeout", format!("{}s", config.llm.timeout_secs));
    push_kv(
        &mut output,
        "timeout_backoff",
        format!("{}s", config.llm.timeout_backoff_secs),
    );
    output.push('\n');

    output.push_str("Window\n");
    push_kv(&mut output, "title_pattern", &config.window.title_pattern);
    push_kv(&mut output, "busy_marker", &config.window.busy_marker);
    push_kv(&mut output, "confirm_key", &config.window.confirm_key);
    output.push('\n');

    output.push_str("Prompt\n");
    push_kv(&mut output, "document", config.prompt.document.display());
    push_kv(&mut output, "continuation", &config.prompt.continuation);
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

/// JSON view of the effective configuration.
pub fn render_json(config: &ProjectConfig, config_path: Option<&Path>) -> Result<String> {
    let mut payload = serde_json::to_value(config).context("failed to serialize config")?;
    payload["source_path"] = serde_json::Value::String(config_source_label(config_path));
    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}
