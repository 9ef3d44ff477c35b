use std::time::Duration;

use peerrank_core::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Evaluator endpoint configuration
#[derive(Clone)]
pub struct EvaluatorConfig {
    /// Base URL of the chat-completions API (without `/chat/completions`)
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Sampling temperature; 0 keeps scores reproducible
    pub temperature: f32,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Refuse to start without an API key
    pub require_api_key: bool,
}

impl std::fmt::Debug for EvaluatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("require_api_key", &self.require_api_key)
            .finish()
    }
}

impl EvaluatorConfig {
    /// Config for a specific endpoint and model, no key
    pub fn new(base_url: &str, model: &str) -> Self {
        EvaluatorConfig {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            require_api_key: true,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Allow a keyless endpoint (local OpenAI-compatible servers)
    pub fn without_auth(mut self) -> Self {
        self.require_api_key = false;
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Startup checks. Failing any of them is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.require_api_key
            && self
                .api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential(
                "evaluator API key (set OPENAI_API_KEY or pass --api-key)".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(self.base_url.clone()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidEndpoint("empty model name".to_string()));
        }
        if !(self.temperature.is_finite() && (0.0..=2.0).contains(&self.temperature)) {
            return Err(ConfigError::OutOfRange {
                field: "evaluator.temperature",
                value: self.temperature.to_string(),
                expected: "in [0, 2]",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_fatal_unless_keyless() {
        let config = EvaluatorConfig::new("https://api.example.com/v1", "m");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential(_))
        ));

        config.clone().with_api_key("sk-test").validate().unwrap();
        config.without_auth().validate().unwrap();
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = EvaluatorConfig::new("https://api.example.com/v1", "m").with_api_key("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_checks() {
        let bad = EvaluatorConfig::new("api.example.com", "m").without_auth();
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let mut hot = EvaluatorConfig::new("http://localhost:8080/v1", "m").without_auth();
        hot.temperature = 3.0;
        assert!(hot.validate().is_err());
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let config = EvaluatorConfig::new("http://localhost:8080/v1/", "m");
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = EvaluatorConfig::new("https://x", "m").with_api_key("sk-secret");
        let shown = format!("{config:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("redacted"));
    }
}
