//! Safer-alternative fetch, independent of the staged pipeline
//!
//! Fires once product identity is known and never blocks the report.
//! Failure or timeout yields `None` ("no recommendations available"),
//! never an error.

use crate::services::RecommendationService;
use crate::types::{ProductIdentity, Recommendations};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One-shot recommendation fetcher with an idempotence guard
pub struct RecommendationFetcher {
    service: Arc<dyn RecommendationService>,
    timeout: Duration,
}

impl RecommendationFetcher {
    pub fn new(service: Arc<dyn RecommendationService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Fetch recommendations unless a value already exists
    ///
    /// The guard is keyed on "do we already have a non-null value", not on
    /// request-in-flight tracking; callers invoke this once per identity
    /// change.
    pub async fn fetch(
        &self,
        identity: &ProductIdentity,
        existing: Option<&Recommendations>,
    ) -> Option<Recommendations> {
        if existing.is_some() {
            return existing.cloned();
        }

        match tokio::time::timeout(self.timeout, self.service.get_recommendations(identity)).await
        {
            Ok(Ok(recommendations)) => Some(recommendations),
            Ok(Err(e)) => {
                warn!(product = %identity.name, "Recommendation fetch failed: {}", e);
                None
            }
            Err(_) => {
                warn!(product = %identity.name, "Recommendation fetch timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VettedProduct;
    use async_trait::async_trait;
    use scanwise_common::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RecommendationService for CountingService {
        async fn get_recommendations(
            &self,
            _identity: &ProductIdentity,
        ) -> Result<Recommendations> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Http("boom".into()))
            } else {
                Ok(Recommendations {
                    vetted_products: vec![VettedProduct {
                        id: "1".into(),
                        name: "Better".into(),
                        price: None,
                        image_url: None,
                        permalink: None,
                        description: None,
                    }],
                    ai_alternatives: vec![],
                })
            }
        }
    }

    #[tokio::test]
    async fn test_existing_value_short_circuits() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let fetcher = RecommendationFetcher::new(service.clone(), Duration::from_secs(5));

        let existing = Recommendations::default();
        let result = fetcher
            .fetch(&ProductIdentity::default(), Some(&existing))
            .await;
        assert!(result.is_some());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_yields_none() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let fetcher = RecommendationFetcher::new(service.clone(), Duration::from_secs(5));

        let result = fetcher.fetch(&ProductIdentity::default(), None).await;
        assert!(result.is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_returns_value() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let fetcher = RecommendationFetcher::new(service, Duration::from_secs(5));

        let result = fetcher.fetch(&ProductIdentity::default(), None).await;
        assert_eq!(result.unwrap().vetted_products.len(), 1);
    }
}
