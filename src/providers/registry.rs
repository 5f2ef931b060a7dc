//! Construction and lookup of the configured adapters.
//!
//! Registration order matters: the disabled-smart-routing path and the
//! fallback chains walk providers in the order they were constructed, so
//! the registry keeps a Vec rather than a bare map.

use anyhow::Result;

use super::base::Provider;
use super::configs::ProviderConfig;
use super::gemini::GeminiProvider;
use super::groq::GroqProvider;
use super::mistral::MistralProvider;
use super::openrouter::OpenRouterProvider;
use crate::config::Settings;

pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build every configured adapter. Providers with missing credentials
    /// are still constructed; they report `is_available() == false`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut providers: Vec<Box<dyn Provider>> = Vec::new();
        for config in &settings.providers {
            providers.push(build_provider(config.clone())?);
        }
        Ok(Self { providers })
    }

    /// Inject pre-built providers, preserving the given order. Used by tests
    /// and embedders that construct adapters themselves.
    pub fn with_providers(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
            .map(|provider| provider.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Every registered provider name, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Names of providers with credentials configured, in registration order.
    pub fn available_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.name())
            .collect()
    }
}

fn build_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::Gemini(config) => Ok(Box::new(GeminiProvider::new(config)?)),
        ProviderConfig::Groq(config) => Ok(Box::new(GroqProvider::new(config)?)),
        ProviderConfig::Mistral(config) => Ok(Box::new(MistralProvider::new(config)?)),
        ProviderConfig::OpenRouter(config) => Ok(Box::new(OpenRouterProvider::new(config)?)),
    }
}
