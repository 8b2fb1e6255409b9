//! Ranked provider fallback.
//!
//! `FallbackSelector` walks a priority-ordered provider list, skipping
//! entries the registry has disabled, and returns the first successful
//! result. Every call runs under a per-call timeout; a timeout counts as
//! a failure like any other. Health bookkeeping goes through the shared
//! `ProviderRegistry` so concurrent sessions see each other's failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AllProvidersFailed, ProviderAttempt, ProviderError};
use crate::providers::registry::ProviderRegistry;
use crate::providers::ProviderName;
use crate::types::ProviderCategory;

/// A successful fallback outcome: which provider answered, and with what.
#[derive(Debug)]
pub struct Selected<T> {
    pub provider: String,
    pub value: T,
}

/// Walks providers in priority order until one succeeds.
pub struct FallbackSelector {
    registry: Arc<ProviderRegistry>,
    call_timeout: Duration,
}

impl FallbackSelector {
    pub fn new(registry: Arc<ProviderRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Invoke `invoke` against each eligible provider in order, returning
    /// the first success. Disabled providers are skipped and noted in the
    /// attempt history without touching their failure counters. When every
    /// provider fails or is skipped, the full history comes back in
    /// `AllProvidersFailed`.
    pub async fn call<P, T, F, Fut>(
        &self,
        category: ProviderCategory,
        providers: &[Arc<P>],
        mut invoke: F,
    ) -> std::result::Result<Selected<T>, AllProvidersFailed>
    where
        P: ProviderName + ?Sized,
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut attempts = Vec::new();

        for (index, provider) in providers.iter().enumerate() {
            let name = provider.name().to_string();

            if !self.registry.is_available(category, &name) {
                debug!(
                    provider = %name,
                    %category,
                    "Skipping disabled provider"
                );
                attempts.push(ProviderAttempt {
                    provider: name,
                    error: "skipped: disabled until cooldown or reset".to_string(),
                });
                continue;
            }

            debug!(
                provider = %name,
                %category,
                attempt = index + 1,
                of = providers.len(),
                "Calling provider"
            );

            let outcome = tokio::time::timeout(self.call_timeout, invoke(Arc::clone(provider)))
                .await
                .unwrap_or(Err(ProviderError::Timeout {
                    timeout_secs: self.call_timeout.as_secs(),
                }));

            match outcome {
                Ok(value) => {
                    self.registry.record_success(category, &name);
                    return Ok(Selected {
                        provider: name,
                        value,
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(
                        provider = %name,
                        %category,
                        error = %message,
                        "Provider call failed, trying next"
                    );
                    self.registry.record_failure(category, &name, &message);
                    attempts.push(ProviderAttempt {
                        provider: name,
                        error: message,
                    });
                }
            }
        }

        Err(AllProvidersFailed { category, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{AiProvider, MockAiProvider};

    fn selector(threshold: u32, names: &[&str]) -> FallbackSelector {
        selector_with_timeout(threshold, names, Duration::from_secs(5))
    }

    fn selector_with_timeout(
        threshold: u32,
        names: &[&str],
        call_timeout: Duration,
    ) -> FallbackSelector {
        let mut registry = ProviderRegistry::new(threshold, Duration::from_secs(300));
        for name in names {
            registry.register(name, ProviderCategory::Ai);
        }
        FallbackSelector::new(Arc::new(registry), call_timeout)
    }

    async fn generate(
        selector: &FallbackSelector,
        providers: &[Arc<MockAiProvider>],
    ) -> std::result::Result<Selected<String>, AllProvidersFailed> {
        selector
            .call(ProviderCategory::Ai, providers, |p| async move {
                p.generate("prompt", 256).await
            })
            .await
    }

    #[tokio::test]
    async fn test_first_provider_succeeds() {
        let selector = selector(3, &["primary", "secondary"]);
        let primary = Arc::new(MockAiProvider::new("primary"));
        primary.queue_response("primary answer");
        let secondary = Arc::new(MockAiProvider::new("secondary"));
        let providers = vec![Arc::clone(&primary), Arc::clone(&secondary)];

        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.provider, "primary");
        assert_eq!(selected.value, "primary answer");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_to_secondary_on_failure() {
        let selector = selector(3, &["primary", "secondary"]);
        let primary = Arc::new(MockAiProvider::failing("primary", "connection refused"));
        let secondary = Arc::new(MockAiProvider::new("secondary"));
        secondary.queue_response("secondary answer");
        let providers = vec![Arc::clone(&primary), Arc::clone(&secondary)];

        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.provider, "secondary");
        assert_eq!(selected.value, "secondary answer");

        let registry = selector.registry();
        assert_eq!(
            registry.consecutive_failures(ProviderCategory::Ai, "primary"),
            1
        );
        assert_eq!(
            registry.consecutive_failures(ProviderCategory::Ai, "secondary"),
            0
        );
    }

    #[tokio::test]
    async fn test_all_providers_failed_preserves_attempt_order() {
        let selector = selector(3, &["primary", "secondary"]);
        let providers = vec![
            Arc::new(MockAiProvider::failing("primary", "boom one")),
            Arc::new(MockAiProvider::failing("secondary", "boom two")),
        ];

        let err = generate(&selector, &providers).await.unwrap_err();
        assert_eq!(err.category, ProviderCategory::Ai);
        assert_eq!(err.attempts.len(), 2);
        assert_eq!(err.attempts[0].provider, "primary");
        assert!(err.attempts[0].error.contains("boom one"));
        assert_eq!(err.attempts[1].provider, "secondary");
        assert!(err.attempts[1].error.contains("boom two"));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_skipped_without_counting() {
        let selector = selector(1, &["primary", "secondary"]);
        let primary = Arc::new(MockAiProvider::failing("primary", "boom"));
        let secondary = Arc::new(MockAiProvider::new("secondary"));
        secondary.queue_response("one");
        secondary.queue_response("two");
        let providers = vec![Arc::clone(&primary), Arc::clone(&secondary)];

        // First call trips the threshold of 1 and disables primary.
        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.provider, "secondary");
        assert_eq!(primary.calls(), 1);

        // Second call must not invoke primary at all.
        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.provider, "secondary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(
            selector
                .registry()
                .consecutive_failures(ProviderCategory::Ai, "primary"),
            1
        );
    }

    #[tokio::test]
    async fn test_reset_makes_provider_eligible_again() {
        let selector = selector(1, &["primary", "secondary"]);
        let primary = Arc::new(MockAiProvider::failing("primary", "boom"));
        let secondary = Arc::new(MockAiProvider::new("secondary"));
        secondary.queue_response("one");
        let providers = vec![Arc::clone(&primary), Arc::clone(&secondary)];

        generate(&selector, &providers).await.unwrap();
        assert!(!selector
            .registry()
            .is_available(ProviderCategory::Ai, "primary"));

        selector.registry().reset(ProviderCategory::Ai, None);
        assert!(selector
            .registry()
            .is_available(ProviderCategory::Ai, "primary"));

        // Eligible again: invoked (and fails) on the next call.
        let err = generate(&selector, &providers).await.unwrap_err();
        assert_eq!(primary.calls(), 2);
        assert_eq!(err.attempts[0].provider, "primary");
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let selector =
            selector_with_timeout(3, &["primary", "secondary"], Duration::from_millis(50));
        let primary = Arc::new(MockAiProvider::slow("primary", Duration::from_secs(10)));
        let secondary = Arc::new(MockAiProvider::new("secondary"));
        secondary.queue_response("fast answer");
        let providers = vec![Arc::clone(&primary), Arc::clone(&secondary)];

        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.provider, "secondary");
        assert_eq!(
            selector
                .registry()
                .consecutive_failures(ProviderCategory::Ai, "primary"),
            1
        );

        let health = selector.registry().snapshot();
        let primary_health = health.iter().find(|h| h.name == "primary").unwrap();
        assert!(primary_health
            .last_error
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_success_resets_counter_after_earlier_failures() {
        let selector = selector(3, &["primary"]);
        let flaky = Arc::new(MockAiProvider::new("primary"));
        let providers = vec![Arc::clone(&flaky)];

        // Force two failures through a failing twin registered under the same name.
        let failing = Arc::new(MockAiProvider::failing("primary", "boom"));
        let failing_providers = vec![Arc::clone(&failing)];
        generate(&selector, &failing_providers).await.unwrap_err();
        generate(&selector, &failing_providers).await.unwrap_err();
        assert_eq!(
            selector
                .registry()
                .consecutive_failures(ProviderCategory::Ai, "primary"),
            2
        );

        flaky.queue_response("recovered");
        let selected = generate(&selector, &providers).await.unwrap();
        assert_eq!(selected.value, "recovered");
        assert_eq!(
            selector
                .registry()
                .consecutive_failures(ProviderCategory::Ai, "primary"),
            0
        );
    }
}
