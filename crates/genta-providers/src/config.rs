//! Configuration loading and generation-service factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use genta_core::traits::GenerationService;
use genta_core::Language;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::unconfigured::UnconfiguredProvider;

const LOCAL_CONFIG: &str = "genta.toml";
const OPENAI_KEY_ENV: &str = "GENTA_OPENAI_KEY";
const ANTHROPIC_KEY_ENV: &str = "GENTA_ANTHROPIC_KEY";

/// Backend used for feedback generation.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationConfig {
    OpenAI {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Anthropic {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
}

impl GenerationConfig {
    pub fn api_key(&self) -> &str {
        match self {
            GenerationConfig::OpenAI { api_key, .. } | GenerationConfig::Anthropic { api_key, .. } => {
                api_key
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            GenerationConfig::OpenAI { .. } => "openai",
            GenerationConfig::Anthropic { .. } => "anthropic",
        }
    }

    fn set_api_key(&mut self, key: String) {
        match self {
            GenerationConfig::OpenAI { api_key, .. } | GenerationConfig::Anthropic { api_key, .. } => {
                *api_key = key
            }
        }
    }

    fn resolved(&self) -> GenerationConfig {
        match self {
            GenerationConfig::OpenAI {
                api_key,
                base_url,
                model,
            } => GenerationConfig::OpenAI {
                api_key: resolve_env_vars(api_key),
                base_url: base_url.as_deref().map(resolve_env_vars),
                model: model.as_deref().map(resolve_env_vars),
            },
            GenerationConfig::Anthropic {
                api_key,
                base_url,
                model,
            } => GenerationConfig::Anthropic {
                api_key: resolve_env_vars(api_key),
                base_url: base_url.as_deref().map(resolve_env_vars),
                model: model.as_deref().map(resolve_env_vars),
            },
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, base_url, model) = match self {
            GenerationConfig::OpenAI { base_url, model, .. } => ("OpenAI", base_url, model),
            GenerationConfig::Anthropic { base_url, model, .. } => ("Anthropic", base_url, model),
        };
        f.debug_struct(name)
            .field("api_key", &"***")
            .field("base_url", base_url)
            .field("model", model)
            .finish()
    }
}

/// Relative weights of the three queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_critical_weight")]
    pub critical: u32,
    #[serde(default = "default_default_weight")]
    pub default: u32,
    #[serde(default = "default_low_weight")]
    pub low: u32,
}

fn default_critical_weight() -> u32 {
    6
}
fn default_default_weight() -> u32 {
    3
}
fn default_low_weight() -> u32 {
    1
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            critical: default_critical_weight(),
            default: default_default_weight(),
            low: default_low_weight(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Max tasks processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Sleep between polls when every queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    /// How often expired jobs are reclaimed.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
    #[serde(default)]
    pub weights: WeightsConfig,
}

fn default_concurrency() -> usize {
    10
}
fn default_poll_interval() -> u64 {
    100
}
fn default_retry_base_delay() -> u64 {
    1000
}
fn default_retry_max_delay() -> u64 {
    60_000
}
fn default_prune_interval() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            prune_interval_secs: default_prune_interval(),
            weights: WeightsConfig::default(),
        }
    }
}

/// Top-level genta configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GentaConfig {
    /// Feedback backend; absent means feedback generation is disabled.
    #[serde(default)]
    pub generation: Option<GenerationConfig>,
    #[serde(default)]
    pub feedback_language: Language,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Apply key overrides. A key only lands on a matching (or missing)
/// `[generation]` table; the Anthropic key is considered first.
fn apply_key_overrides(config: &mut GentaConfig, openai: Option<String>, anthropic: Option<String>) {
    if let Some(key) = anthropic {
        match config.generation {
            Some(ref mut existing @ GenerationConfig::Anthropic { .. }) => existing.set_api_key(key),
            None => {
                config.generation = Some(GenerationConfig::Anthropic {
                    api_key: key,
                    base_url: None,
                    model: None,
                })
            }
            Some(_) => {}
        }
    }

    if let Some(key) = openai {
        match config.generation {
            Some(ref mut existing @ GenerationConfig::OpenAI { .. }) => existing.set_api_key(key),
            None => {
                config.generation = Some(GenerationConfig::OpenAI {
                    api_key: key,
                    base_url: None,
                    model: None,
                })
            }
            Some(_) => {}
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `genta.toml` in the current directory
/// 2. `~/.config/genta/config.toml`
///
/// Environment variable overrides: `GENTA_OPENAI_KEY`, `GENTA_ANTHROPIC_KEY`.
pub fn load_config() -> Result<GentaConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GentaConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(LOCAL_CONFIG);
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => GentaConfig::default(),
    };

    apply_key_overrides(
        &mut config,
        std::env::var(OPENAI_KEY_ENV).ok(),
        std::env::var(ANTHROPIC_KEY_ENV).ok(),
    );
    config.generation = config.generation.as_ref().map(GenerationConfig::resolved);

    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<GentaConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<GentaConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("genta"))
}

/// Build the generation service described by the config.
///
/// A missing `[generation]` table or an empty key yields the unconfigured
/// placeholder so feedback jobs complete without text instead of failing.
pub fn create_generator(config: &GentaConfig) -> Result<Arc<dyn GenerationService>> {
    let Some(generation) = config.generation.as_ref() else {
        tracing::info!("no generation backend configured; feedback generation disabled");
        return Ok(Arc::new(UnconfiguredProvider));
    };

    if generation.api_key().trim().is_empty() {
        tracing::warn!(
            provider = generation.provider_name(),
            "generation API key is empty; feedback generation disabled"
        );
        return Ok(Arc::new(UnconfiguredProvider));
    }

    let service: Arc<dyn GenerationService> = match generation {
        GenerationConfig::OpenAI {
            api_key,
            base_url,
            model,
        } => Arc::new(OpenAiProvider::new(api_key, model.clone(), base_url.clone())?),
        GenerationConfig::Anthropic {
            api_key,
            base_url,
            model,
        } => Arc::new(AnthropicProvider::new(api_key, model.clone(), base_url.clone())?),
    };
    Ok(service)
}
