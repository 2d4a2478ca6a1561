//! The `genta list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use genta_providers::{create_generator, load_config_from};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let generator = create_generator(&config)?;

    if !generator.is_configured() {
        println!("No generation backend configured. Run `genta init` to create a config file.");
        return Ok(());
    }

    let configured_model = match &config.generation {
        Some(
            genta_providers::GenerationConfig::OpenAI { model, .. }
            | genta_providers::GenerationConfig::Anthropic { model, .. },
        ) => model.clone(),
        None => None,
    };

    println!("Provider: {}", generator.name());
    for model in generator.available_models() {
        let marker = if configured_model.as_deref() == Some(model.id.as_str()) {
            " (configured)"
        } else {
            ""
        };
        println!(
            "  {} - {} ({}K context){marker}",
            model.id,
            model.name,
            model.max_context / 1000,
        );
    }
    println!("Feedback language: {}", config.feedback_language);

    Ok(())
}
