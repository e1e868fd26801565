//! Provider registration logic.
//!
//! Providers are registered from an explicit, statically-constructed list
//! derived from configuration; there is no runtime discovery. Each
//! registered provider is keyed by its "<provider_type>.<config_name>"
//! reference.

use anyhow::Result;
use tracing::debug;

use atelier_config::Config;
use atelier_providers::{OpenAiCompatibleProvider, ProviderRegistry};

/// Register all configured providers and select the default.
pub fn register_providers(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    register_openai_providers(config, &mut registry)?;

    debug!(
        "Setting default provider to: {}",
        config.providers.default_provider
    );
    registry.set_default(&config.providers.default_provider)?;

    Ok(registry)
}

/// Register OpenAI-compatible providers from configuration.
fn register_openai_providers(config: &Config, registry: &mut ProviderRegistry) -> Result<()> {
    for (name, openai_config) in &config.providers.openai {
        let provider = OpenAiCompatibleProvider::new_with_name(
            format!("openai.{}", name),
            openai_config.api_key.clone(),
            Some(openai_config.model.clone()),
            openai_config.base_url.clone(),
            openai_config.max_tokens,
            openai_config.temperature,
        )?;
        registry.register(provider);
    }
    Ok(())
}
