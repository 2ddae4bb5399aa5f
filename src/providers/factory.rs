use crate::config::{Config, Provider};
use crate::core::error::ChatError;
use crate::providers::{
    LLMProvider, anthropic::AnthropicProvider, openai_compatible::OpenAICompatibleProvider,
};
use std::collections::HashMap;
use tracing::info;

/// Fully resolved connection settings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub prompt_caching: bool,
}

impl ProviderSettings {
    /// Merges CLI overrides, the config file and built-in defaults.
    pub fn resolve(
        provider: Provider,
        config: &Config,
        model_override: Option<&str>,
    ) -> Result<Self, ChatError> {
        let provider_config = config.provider_config(provider);
        Ok(Self {
            api_key: config.resolve_api_key(provider)?,
            base_url: provider_config
                .base_url
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            model: model_override
                .map(str::to_string)
                .or(provider_config.model)
                .unwrap_or_else(|| provider.default_model().to_string()),
            max_tokens: config.max_tokens,
            prompt_caching: config.prompt_caching,
        })
    }
}

type ProviderCreator =
    Box<dyn Fn(&ProviderSettings) -> Result<Box<dyn LLMProvider>, ChatError> + Send + Sync>;

fn openai_compatible(settings: &ProviderSettings) -> Box<dyn LLMProvider> {
    Box::new(OpenAICompatibleProvider::new(
        settings.base_url.clone(),
        settings.api_key.clone(),
        settings.model.clone(),
        settings.max_tokens,
        None,
    ))
}

pub struct ProviderFactory {
    creators: HashMap<Provider, ProviderCreator>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        let mut creators = HashMap::new();

        creators.insert(
            Provider::Anthropic,
            Box::new(|settings: &ProviderSettings| {
                let provider = AnthropicProvider::new(
                    settings.api_key.clone(),
                    Some(settings.base_url.clone()),
                    settings.model.clone(),
                    settings.max_tokens,
                )
                .with_prompt_caching(settings.prompt_caching);
                Ok(Box::new(provider) as Box<dyn LLMProvider>)
            }) as ProviderCreator,
        );

        creators.insert(
            Provider::OpenAI,
            Box::new(|settings: &ProviderSettings| Ok(openai_compatible(settings)))
                as ProviderCreator,
        );

        creators.insert(
            Provider::OpenRouter,
            Box::new(|settings: &ProviderSettings| {
                let mut headers = HashMap::new();
                headers.insert("X-Title".to_string(), "toolchat".to_string());
                let provider = OpenAICompatibleProvider::new(
                    settings.base_url.clone(),
                    settings.api_key.clone(),
                    settings.model.clone(),
                    settings.max_tokens,
                    Some(headers),
                );
                Ok(Box::new(provider) as Box<dyn LLMProvider>)
            }) as ProviderCreator,
        );

        creators.insert(
            Provider::DeepSeek,
            Box::new(|settings: &ProviderSettings| Ok(openai_compatible(settings)))
                as ProviderCreator,
        );

        Self { creators }
    }

    pub fn create(
        &self,
        provider: &Provider,
        settings: &ProviderSettings,
    ) -> Result<Box<dyn LLMProvider>, ChatError> {
        info!(provider = provider.name(), model = %settings.model, "creating provider");
        self.creators
            .get(provider)
            .ok_or_else(|| ChatError::Config(format!("Provider not found: {:?}", provider)))
            .and_then(|creator| creator(settings))
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn config_with(provider: Provider, provider_config: ProviderConfig) -> Config {
        let mut config = Config::default();
        config.providers.insert(provider, provider_config);
        config
    }

    #[test]
    fn settings_prefer_override_then_config_then_defaults() {
        let config = config_with(
            Provider::OpenRouter,
            ProviderConfig {
                api_key: Some("key".to_string()),
                base_url: None,
                model: Some("from/config".to_string()),
            },
        );

        let settings = ProviderSettings::resolve(Provider::OpenRouter, &config, None).unwrap();
        assert_eq!(settings.model, "from/config");
        assert_eq!(settings.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(settings.max_tokens, config.max_tokens);
        assert!(settings.prompt_caching);

        let settings =
            ProviderSettings::resolve(Provider::OpenRouter, &config, Some("cli/model")).unwrap();
        assert_eq!(settings.model, "cli/model");
    }

    #[test]
    fn every_provider_has_a_creator() {
        let factory = ProviderFactory::new();
        for provider in [
            Provider::Anthropic,
            Provider::OpenAI,
            Provider::OpenRouter,
            Provider::DeepSeek,
        ] {
            let config = config_with(
                provider,
                ProviderConfig {
                    api_key: Some("key".to_string()),
                    base_url: Some("http://localhost:9".to_string()),
                    model: None,
                },
            );
            let settings = ProviderSettings::resolve(provider, &config, None).unwrap();
            let created = factory.create(&provider, &settings).unwrap();
            assert_eq!(created.model(), provider.default_model());
        }
    }
}
