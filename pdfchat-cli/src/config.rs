//! Application configuration, resolved once from the command line and environment.

use std::sync::Arc;
use std::time::Duration;

use pdfchat_rag::openai::{OpenAIChatModel, OpenAIConfig, OpenAIEmbeddingProvider};
use pdfchat_rag::pinecone::{PineconeConfig, PineconeVectorStore};
use pdfchat_rag::{
    CollectionSpec, DirectoryLoader, DistanceMetric, LoadPolicy, LoaderConfig, QaChain, RagConfig,
    RagError, RagPipeline, Result,
};

use crate::cli::Settings;

/// Everything the pipelines need, validated up front.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: OpenAIConfig,
    pub pinecone: PineconeConfig,
    pub rag: RagConfig,
    pub loader: LoaderConfig,
    pub collection: CollectionSpec,
    /// Limit for each external call, including generation.
    pub timeout: Duration,
}

fn required(value: &Option<String>, variable: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(RagError::ConfigError(format!("{variable} must be set (environment or .env file)"))),
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when a credential is missing or a setting
    /// is out of range.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.timeout_secs == 0 {
            return Err(RagError::ConfigError("timeout must be at least one second".to_string()));
        }
        let timeout = Duration::from_secs(settings.timeout_secs);

        let mut openai = OpenAIConfig::new(required(&settings.openai_api_key, "OPENAI_API_KEY")?)?
            .with_request_timeout(timeout);
        if let Some(base_url) = &settings.openai_base_url {
            openai = openai.with_base_url(base_url);
        }
        if let Some(model) = &settings.chat_model {
            openai = openai.with_chat_model(model);
        }

        let pinecone = PineconeConfig::new(
            required(&settings.pinecone_api_key, "PINECONE_API_KEY")?,
            required(&settings.pinecone_environment, "PINECONE_ENVIRONMENT")?,
        )?
        .with_request_timeout(timeout);

        let rag = RagConfig::builder()
            .chunk_size(settings.chunk_size)
            .chunk_overlap(settings.chunk_overlap)
            .top_k(settings.top_k)
            .build()?;

        let loader = LoaderConfig {
            root: settings.documents_dir.clone(),
            pattern: settings.glob.clone(),
            concurrency: settings.concurrency.max(1),
            policy: if settings.fail_fast { LoadPolicy::Abort } else { LoadPolicy::SkipAndLog },
        };

        let collection = CollectionSpec::new(
            settings.collection.clone(),
            openai.embedding_dimensions,
            DistanceMetric::Cosine,
        );

        Ok(Self { openai, pinecone, rag, loader, collection, timeout })
    }

    /// OpenAI embeddings into the Pinecone collection.
    pub fn pipeline(&self) -> Result<Arc<RagPipeline>> {
        let pipeline = RagPipeline::builder()
            .config(self.rag.clone())
            .embedding_provider(Arc::new(OpenAIEmbeddingProvider::new(self.openai.clone())))
            .vector_store(
                Arc::new(PineconeVectorStore::new(self.pinecone.clone())),
                self.collection.clone(),
            )
            .build()?;
        Ok(Arc::new(pipeline))
    }

    pub fn chain(&self, pipeline: Arc<RagPipeline>) -> QaChain {
        QaChain::new(pipeline, Arc::new(OpenAIChatModel::new(&self.openai)))
            .with_generation_timeout(self.timeout)
    }

    pub fn directory_loader(&self) -> DirectoryLoader {
        DirectoryLoader::pdf(self.loader.clone())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["pdfchat", "ingest"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().settings
    }

    fn with_credentials(extra: &[&str]) -> Settings {
        let mut args = vec![
            "--openai-api-key",
            "sk-test",
            "--pinecone-api-key",
            "pc-test",
            "--pinecone-environment",
            "us-east-1",
        ];
        args.extend_from_slice(extra);
        settings(&args)
    }

    #[test]
    fn builds_defaults_from_credentials() {
        let config = AppConfig::from_settings(&with_credentials(&[])).unwrap();
        assert_eq!(config.collection, CollectionSpec::default());
        assert_eq!(config.rag, RagConfig::default());
        assert_eq!(config.loader, LoaderConfig::default());
        assert_eq!(config.pinecone.environment, "us-east-1");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let mut settings = with_credentials(&[]);
        settings.openai_api_key = None;
        let err = AppConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(&err, RagError::ConfigError(message) if message.contains("OPENAI_API_KEY")));

        let mut settings = with_credentials(&[]);
        settings.pinecone_environment = Some("  ".to_string());
        let err = AppConfig::from_settings(&settings).unwrap_err();
        assert!(
            matches!(&err, RagError::ConfigError(message) if message.contains("PINECONE_ENVIRONMENT"))
        );
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let settings = with_credentials(&["--chunk-size", "50", "--chunk-overlap", "50"]);
        assert!(matches!(AppConfig::from_settings(&settings), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn fail_fast_selects_abort_policy() {
        let config = AppConfig::from_settings(&with_credentials(&["--fail-fast"])).unwrap();
        assert_eq!(config.loader.policy, LoadPolicy::Abort);
    }

    #[test]
    fn debug_output_hides_keys() {
        let config = AppConfig::from_settings(&with_credentials(&[])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("pc-test"));
    }
}
