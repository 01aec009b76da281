//! LLM Router
//!
//! Ranks the configured providers and fails over between them. The configured
//! default provider is tried first, then local providers, then the cheapest.
//! Each attempt runs under its own timeout; the first reply wins.

use super::{LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use std::sync::Arc;
use std::time::Duration;

/// Per-attempt timeout for local providers (model loading + generation)
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-attempt timeout for cloud providers
pub const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

/// LLM Router that selects a provider and fails over on errors
pub struct LLMRouter {
    /// Available LLM providers
    providers: Vec<Box<dyn LLMProvider>>,

    /// LLM configuration
    config: Arc<LLMConfig>,

    local_timeout: Duration,
    cloud_timeout: Duration,
}

impl LLMRouter {
    /// Create a new LLM router
    ///
    /// # Arguments
    /// * `providers` - List of available LLM providers
    /// * `config` - LLM configuration
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self {
            providers,
            config,
            local_timeout: LOCAL_TIMEOUT,
            cloud_timeout: CLOUD_TIMEOUT,
        }
    }

    /// Override the per-attempt timeouts
    pub fn with_timeouts(mut self, local: Duration, cloud: Duration) -> Self {
        self.local_timeout = local;
        self.cloud_timeout = cloud;
        self
    }

    /// Shrink the per-attempt timeouts so a local and a cloud attempt
    /// together end before `deadline`
    ///
    /// Timeouts that already fit are left alone. Otherwise both are scaled
    /// down proportionally to 90% of the deadline.
    pub fn within_deadline(mut self, deadline: Duration) -> Self {
        let budget = self.local_timeout + self.cloud_timeout;
        if budget < deadline || budget.is_zero() {
            return self;
        }

        let scale = deadline.as_secs_f64() * 0.9 / budget.as_secs_f64();
        self.local_timeout = self.local_timeout.mul_f64(scale);
        self.cloud_timeout = self.cloud_timeout.mul_f64(scale);
        self
    }

    /// Per-attempt timeouts as `(local, cloud)`
    pub fn attempt_timeouts(&self) -> (Duration, Duration) {
        (self.local_timeout, self.cloud_timeout)
    }

    /// Estimate token count for the request
    ///
    /// Uses a simple heuristic: ~4 bytes per token
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        total_chars / 4
    }

    /// Rank providers for a request of `estimated_tokens`
    ///
    /// Returns a sorted list of providers (best first). The sort is stable, so
    /// equally ranked providers keep their registration order.
    pub fn rank_providers(&self, estimated_tokens: usize) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let default_provider = &self.config.default_provider;
        let score = |p: &dyn LLMProvider| {
            let mut score = 0.0_f64;

            // Strongly prefer the user's configured default provider
            if p.name() == default_provider {
                score += 200.0;
            }

            if p.is_local() {
                score += 50.0;
            }

            // Lower cost = higher score
            score - p.estimated_cost(estimated_tokens) * 1000.0
        };

        providers.sort_by(|a, b| {
            score(*b)
                .partial_cmp(&score(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        providers
    }

    /// Call LLM providers with automatic failover
    ///
    /// Returns the reply text and the name of the provider that produced it.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(String, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let ranked_providers = self.rank_providers(self.estimate_tokens(messages));

        for provider in ranked_providers {
            let timeout = if provider.is_local() {
                self.local_timeout
            } else {
                self.cloud_timeout
            };
            tracing::debug!(
                "Attempting provider: {} (timeout: {:?})",
                provider.name(),
                timeout
            );

            match tokio::time::timeout(timeout, provider.generate(messages)).await {
                Ok(Ok(reply)) => {
                    tracing::info!("Provider {} succeeded", provider.name());
                    return Ok((reply, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
                Err(_) => {
                    tracing::warn!("Provider {} timed out after {:?}", provider.name(), timeout);
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        Err(LLMError::ProviderUnavailable(
            "All LLM providers failed".to_string(),
        ))
    }

    /// Check the health of all registered providers
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(&str, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name(), is_healthy));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    // Mock provider for testing
    struct MockProvider {
        name: String,
        is_local: bool,
        cost_per_1k: f64,
    }

    impl MockProvider {
        fn new(name: &str, is_local: bool, cost_per_1k: f64) -> Self {
            Self {
                name: name.to_string(),
                is_local,
                cost_per_1k,
            }
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_local(&self) -> bool {
            self.is_local
        }

        fn estimated_cost(&self, tokens: usize) -> f64 {
            (tokens as f64 / 1000.0) * self.cost_per_1k
        }

        async fn generate(&self, _messages: &[Message]) -> Result<String, LLMError> {
            Ok(format!("reply from {}", self.name))
        }
    }

    fn create_test_config(default_provider: &str) -> Arc<LLMConfig> {
        Arc::new(LLMConfig {
            default_provider: default_provider.to_string(),
            ..LLMConfig::default()
        })
    }

    #[test]
    fn test_attempts_fit_within_deadline() {
        let router = LLMRouter::new(vec![], create_test_config("ollama"))
            .within_deadline(Duration::from_secs(60));

        let (local, cloud) = router.attempt_timeouts();
        assert!(local + cloud < Duration::from_secs(60));
        assert!(local > cloud);
    }

    #[test]
    fn test_generous_deadline_keeps_timeouts() {
        let router = LLMRouter::new(vec![], create_test_config("ollama"))
            .within_deadline(Duration::from_secs(600));

        assert_eq!(router.attempt_timeouts(), (LOCAL_TIMEOUT, CLOUD_TIMEOUT));
    }

    #[test]
    fn test_estimate_tokens() {
        let router = LLMRouter::new(vec![], create_test_config("ollama"));

        let messages = vec![Message::user("This is a test message")];

        let tokens = router.estimate_tokens(&messages);
        assert!((5..=6).contains(&tokens));
    }

    #[test]
    fn test_default_provider_ranked_first() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("ollama", true, 0.0)),
            Box::new(MockProvider::new("openai", false, 0.002)),
        ];

        let router = LLMRouter::new(providers, create_test_config("openai"));
        let ranked = router.rank_providers(1000);

        assert_eq!(ranked[0].name(), "openai");
        assert_eq!(ranked[1].name(), "ollama");
    }

    #[test]
    fn test_local_preferred_over_cloud() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("cloud", false, 0.0)),
            Box::new(MockProvider::new("local", true, 0.0)),
        ];

        let router = LLMRouter::new(providers, create_test_config("none"));
        let ranked = router.rank_providers(1000);

        assert_eq!(ranked[0].name(), "local");
    }

    #[test]
    fn test_rank_providers_consider_cost() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("expensive", false, 0.010)),
            Box::new(MockProvider::new("cheap", false, 0.001)),
            Box::new(MockProvider::new("medium", false, 0.005)),
        ];

        let router = LLMRouter::new(providers, create_test_config("none"));
        let ranked = router.rank_providers(1000);

        assert_eq!(ranked[0].name(), "cheap");
        assert_eq!(ranked[1].name(), "medium");
        assert_eq!(ranked[2].name(), "expensive");
    }

    #[tokio::test]
    async fn test_call_without_providers_fails() {
        let router = LLMRouter::new(vec![], create_test_config("ollama"));

        let err = router.call(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LLMError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_call_returns_reply_and_provider() {
        let providers: Vec<Box<dyn LLMProvider>> =
            vec![Box::new(MockProvider::new("ollama", true, 0.0))];
        let router = LLMRouter::new(providers, create_test_config("ollama"));

        let (reply, provider) = router.call(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply, "reply from ollama");
        assert_eq!(provider, "ollama");
    }
}
