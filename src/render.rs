use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use thiserror::Error;

use crate::config::ResolverConfig;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("wait for selector '{selector}' timed out")]
    WaitTimeout { selector: String },

    #[error("render backend failure: {0}")]
    Backend(String),
}

/// Boundary to the headless rendering engine. The resolver only ever talks
/// to these traits, so tests can substitute a scripted backend.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Navigate to the URL and return a handle to the rendered page. The
    /// implementation waits for the initial navigation to settle before
    /// returning.
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError>;
}

/// A live page for one resolution. Callers must invoke `close` exactly once
/// on every handle they obtained.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Block until the selector appears in the DOM, bounded by `timeout`.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError>;

    /// Snapshot of the current rendered document.
    async fn content(&self) -> Result<String, RenderError>;

    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Round-robin pool of launched Chrome instances. Each resolution gets its
/// own tab; browsers are shared because launching one is the expensive part.
pub struct BrowserPool {
    browsers: Vec<Arc<Browser>>,
    current_index: std::sync::atomic::AtomicUsize,
}

impl BrowserPool {
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        let mut browsers = Vec::new();

        // Cap the pool at 3 browsers; tabs provide the per-request isolation.
        for _ in 0..config.max_concurrent_sessions.min(3) {
            let mut launch_options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false) // Often needed in containerized environments
                .args(vec![
                    std::ffi::OsStr::new("--no-sandbox"),
                    std::ffi::OsStr::new("--disable-dev-shm-usage"),
                    std::ffi::OsStr::new("--disable-gpu"),
                    std::ffi::OsStr::new("--disable-extensions"),
                    std::ffi::OsStr::new("--disable-background-timer-throttling"),
                    std::ffi::OsStr::new("--disable-backgrounding-occluded-windows"),
                    std::ffi::OsStr::new("--disable-renderer-backgrounding"),
                ])
                .build()
                .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

            if let Some(chrome_path) = &config.chrome_path {
                launch_options.path = Some(std::path::PathBuf::from(chrome_path));
            }

            let browser = Browser::new(launch_options)
                .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

            browsers.push(Arc::new(browser));
        }

        Ok(Self {
            browsers,
            current_index: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn get_browser(&self) -> Arc<Browser> {
        let index = self
            .current_index
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            % self.browsers.len();
        self.browsers[index].clone()
    }
}

/// Production backend over headless Chrome.
pub struct ChromeBackend {
    pool: BrowserPool,
    user_agent: String,
    navigation_timeout: Duration,
}

impl ChromeBackend {
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        Ok(Self {
            pool: BrowserPool::new(config)?,
            user_agent: config.user_agent.clone(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout),
        })
    }
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
        let browser = self.pool.get_browser();

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Backend(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(self.navigation_timeout);
        tab.set_user_agent(&self.user_agent, None, None)
            .map_err(|e| RenderError::Backend(format!("Failed to set user agent: {}", e)))?;

        tab.navigate_to(url)
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        // Network-idle boundary: client-rendered markup is not in the DOM
        // until this returns.
        tab.wait_until_navigated()
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        Ok(Box::new(ChromePage { tab, closed: false }))
    }
}

struct ChromePage {
    tab: Arc<Tab>,
    closed: bool,
}

#[async_trait]
impl RenderedPage for ChromePage {
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|_| RenderError::WaitTimeout {
                selector: selector.to_string(),
            })
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.tab
            .get_content()
            .map_err(|e| RenderError::Backend(format!("Failed to get page content: {}", e)))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| RenderError::Backend(format!("Failed to close tab: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;

    fn get_test_config() -> ResolverConfig {
        ResolverConfig {
            max_concurrent_sessions: 2,
            navigation_timeout: 10,
            selector_timeout_ms: 2000,
            resolution_timeout: 30,
            user_agent: "TestAgent/1.0".to_string(),
            chrome_path: None,
        }
    }

    #[test]
    fn test_backend_creation() {
        let config = get_test_config();
        // Requires a local Chrome; in environments without one the launch
        // itself is the failure we expect.
        match ChromeBackend::new(&config) {
            Ok(_) => {}
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                assert!(msg.contains("browser") || msg.contains("chrome"));
            }
        }
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::WaitTimeout {
            selector: "img.gallery-image".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "wait for selector 'img.gallery-image' timed out"
        );

        let err = RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert!(err.to_string().starts_with("navigation failed"));
    }
}
