//! Model and embedding endpoint clients for ragweave.
//!
//! All providers implement the `ragweave_core::Provider` trait. The
//! chat model and the embedding model may live behind different
//! endpoints, so [`from_config`] builds one provider for each.

pub mod openai_compat;

use std::sync::Arc;

use ragweave_config::AppConfig;
use ragweave_core::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build `(chat_provider, embedding_provider)` from configuration.
pub fn from_config(config: &AppConfig) -> (Arc<dyn Provider>, Arc<dyn Provider>) {
    let chat = OpenAiCompatProvider::new(
        "chat",
        &config.model.base_url,
        config.model.api_key.clone().unwrap_or_default(),
    )
    .with_timeout_secs(config.model.timeout_secs);

    let embedding = OpenAiCompatProvider::new(
        "embedding",
        config.embedding_base_url(),
        config.embedding_api_key().unwrap_or_default(),
    )
    .with_timeout_secs(config.embedding.timeout_secs);

    (Arc::new(chat), Arc::new(embedding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_falls_back_to_model_endpoint() {
        let mut config = AppConfig::default();
        config.model.base_url = "http://litellm:4000/v1".into();
        let (chat, embedding) = from_config(&config);
        assert_eq!(chat.name(), "chat");
        assert_eq!(embedding.name(), "embedding");
    }
}
