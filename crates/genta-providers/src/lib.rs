//! genta-providers: Feedback generation backends.
//!
//! Implements the `GenerationService` trait for OpenAI and Anthropic, plus a
//! mock for offline runs and a placeholder used when no key is configured.

mod http;

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod openai;
pub mod unconfigured;

pub use anthropic::AnthropicProvider;
pub use config::{
    create_generator, load_config, load_config_from, GenerationConfig, GentaConfig, WeightsConfig,
    WorkerConfig,
};
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use unconfigured::UnconfiguredProvider;
