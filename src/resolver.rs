use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::config::ResolverConfig;
use crate::render::{RenderBackend, RenderError, RenderedPage};
use crate::rules::{ExtractionStrategy, RuleRegistry, SiteRule};

/// Why a resolution failed. `NotFound` is not a failure; it lives on
/// `ExtractionResult` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    Navigation(String),
    Timeout,
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Found(String),
    NotFound,
    Failed(FailureKind),
}

/// Resolves a product URL to its primary image URL by rendering the page and
/// applying the matching site rule's strategies in order. Safe to share
/// across concurrent requests; the semaphore bounds simultaneous render
/// sessions and queues the overflow FIFO.
pub struct Resolver {
    registry: Arc<RuleRegistry>,
    backend: Arc<dyn RenderBackend>,
    sessions: Arc<Semaphore>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        registry: RuleRegistry,
        backend: Arc<dyn RenderBackend>,
        config: ResolverConfig,
    ) -> Self {
        let sessions = Arc::new(Semaphore::new(config.max_concurrent_sessions));
        Self {
            registry: Arc::new(registry),
            backend,
            sessions,
            config,
        }
    }

    pub async fn resolve(&self, url: &str) -> ExtractionResult {
        // Cheap precondition: an empty URL never earns a render session.
        if url.trim().is_empty() {
            return ExtractionResult::Failed(FailureKind::InvalidInput);
        }

        // A malformed URL fails the same way an unreachable one would.
        if let Err(e) = Url::parse(url) {
            return ExtractionResult::Failed(FailureKind::Navigation(e.to_string()));
        }

        let rule = self.registry.lookup(url);
        debug!(url, rule = %rule.name, "selected site rule");

        let _permit = match self.sessions.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return ExtractionResult::Failed(FailureKind::Internal(
                    "session pool closed".to_string(),
                ))
            }
        };

        let mut page = match self.backend.open(url).await {
            Ok(page) => page,
            Err(RenderError::Navigation(e)) => {
                warn!(url, error = %e, "navigation failed");
                return ExtractionResult::Failed(FailureKind::Navigation(e));
            }
            Err(e) => return ExtractionResult::Failed(FailureKind::Internal(e.to_string())),
        };

        let deadline = Duration::from_secs(self.config.resolution_timeout);
        let outcome = tokio::time::timeout(deadline, self.run_strategies(page.as_ref(), rule)).await;

        // One close per opened session, on every path including timeout.
        if let Err(e) = page.close().await {
            warn!(url, error = %e, "failed to close render session");
        }

        match outcome {
            Ok(Ok(Some(image_url))) => ExtractionResult::Found(image_url),
            Ok(Ok(None)) => ExtractionResult::NotFound,
            Ok(Err(RenderError::Navigation(e))) => {
                ExtractionResult::Failed(FailureKind::Navigation(e))
            }
            Ok(Err(e)) => ExtractionResult::Failed(FailureKind::Internal(e.to_string())),
            Err(_) => ExtractionResult::Failed(FailureKind::Timeout),
        }
    }

    async fn run_strategies(
        &self,
        page: &dyn RenderedPage,
        rule: &SiteRule,
    ) -> Result<Option<String>, RenderError> {
        for strategy in &rule.strategies {
            if let Some(value) = self.apply_strategy(page, strategy).await? {
                return Ok(Some(value));
            }
        }

        // Second tier: the generic strategies run even when a site rule
        // matched, so markup drift degrades to the default instead of a miss.
        if !self.registry.is_default(rule) {
            for strategy in &self.registry.default_rule().strategies {
                if let Some(value) = self.apply_strategy(page, strategy).await? {
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    async fn apply_strategy(
        &self,
        page: &dyn RenderedPage,
        strategy: &ExtractionStrategy,
    ) -> Result<Option<String>, RenderError> {
        if let Some(wait_selector) = &strategy.wait_for {
            let timeout = Duration::from_millis(self.config.selector_timeout_ms);
            match page.wait_for_selector(wait_selector, timeout).await {
                Ok(()) => {}
                Err(RenderError::WaitTimeout { selector }) => {
                    debug!(selector, "wait timed out, advancing to next strategy");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let html = page.content().await?;
        Ok(extract_from_html(&html, strategy))
    }
}

/// Apply one strategy against a rendered DOM snapshot. Pure; all the render
/// I/O happens before this point.
pub fn extract_from_html(html: &str, strategy: &ExtractionStrategy) -> Option<String> {
    let document = Html::parse_document(html);

    let selector = match Selector::parse(&strategy.selector) {
        Ok(selector) => selector,
        Err(e) => {
            warn!(selector = %strategy.selector, "invalid selector in strategy: {:?}", e);
            return None;
        }
    };

    let mut elements = document.select(&selector);

    if strategy.first_of_collection {
        // Evaluate every match, then index the first. A valueless first
        // element yields nothing from this strategy; the loop advances.
        let values: Vec<Option<String>> = elements
            .map(|element| read_attributes(&element, &strategy.attributes))
            .collect();
        values.into_iter().next().flatten()
    } else {
        elements
            .next()
            .and_then(|element| read_attributes(&element, &strategy.attributes))
    }
}

fn read_attributes(element: &ElementRef, attributes: &[String]) -> Option<String> {
    for attribute in attributes {
        if let Some(value) = element.value().attr(attribute) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
