
use anyhow::{Context, Result};
use tracing::debug;

use crate::AssistError;
use crate::config::{GenerationConfig, OllamaConfig};
use crate::embeddings::OllamaClient;
use crate::synthesis::{GenerationOptions, GenerativeProvider};

/// Ollama `/api/generate` backend.
///
/// Requests are attempted once: a slow or failing model is handled by the
/// aggregated fallback rather than by retrying.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(ollama: &OllamaConfig, generation: &GenerationConfig) -> Result<Self> {
        let client = OllamaClient::new(ollama)
            .context("Failed to initialize Ollama client for generation")?
            .with_timeout(generation.options().timeout)
            .with_retry_attempts(1);

        debug!(
            "Generation backend {} at {}",
            generation.model,
            client.base_url()
        );

        Ok(Self {
            client,
            model: generation.model.clone(),
        })
    }

    /// Check the server answers and the generation model is installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.client.ping().context("Server ping failed")?;
        self.client
            .validate_model(&self.model)
            .context("Generation model validation failed")
    }
}

impl GenerativeProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerationOptions) -> crate::Result<String> {
        self.client
            .generate(&self.model, prompt, options)
            .map_err(|e| AssistError::Generation(format!("{:#}", e)))
    }
}
