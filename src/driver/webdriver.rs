//! WebDriver-backed browser session
//!
//! Thin adapter from [`BrowserSession`] onto a chromedriver/geckodriver
//! endpoint via fantoccini. Located elements are kept in a session-local
//! table so the trait can hand out plain ids instead of driver types.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use serde_json::json;
use tracing::debug;

use crate::core::config::DriverConfig;
use crate::core::{ColetorError, Locator, LocatorStrategy, Result};
use crate::driver::session::{BrowserSession, ElementRef, SessionFactory};

/// A browser session driven over the WebDriver protocol
pub struct WebDriverSession {
    client: Client,
    elements: Mutex<HashMap<u64, Element>>,
    next_id: AtomicU64,
}

impl WebDriverSession {
    /// Connect to a WebDriver endpoint and start a session
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let mut caps = serde_json::Map::new();
        let mut args = vec!["--no-sandbox".to_string(), "--disable-dev-shm-usage".to_string()];
        if config.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        debug!(url = %config.webdriver_url, "connecting to WebDriver");
        let client = ClientBuilder::rustls()?
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| {
                ColetorError::driver(format!(
                    "failed to connect to WebDriver at {}: {}",
                    config.webdriver_url, e
                ))
            })?;

        Ok(Self {
            client,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn register(&self, element: Element) -> ElementRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.elements.lock().unwrap().insert(id, element);
        ElementRef::new(id)
    }

    fn element(&self, handle: &ElementRef) -> Result<Element> {
        self.elements
            .lock()
            .unwrap()
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| ColetorError::stale(format!("unknown element handle {}", handle.id())))
    }

    fn forget(&self, handle: &ElementRef) {
        self.elements.lock().unwrap().remove(&handle.id());
    }

    /// Map a driver error onto the crate taxonomy, dropping the table
    /// entry when the reference turned out to be detached.
    fn classify(&self, context: &str, handle: Option<&ElementRef>, err: CmdError) -> ColetorError {
        match &err {
            CmdError::Standard(wd) => match &wd.error {
                ErrorStatus::NoSuchElement => {
                    ColetorError::element_not_found(context.to_string())
                }
                ErrorStatus::StaleElementReference => {
                    if let Some(handle) = handle {
                        self.forget(handle);
                    }
                    ColetorError::stale(context.to_string())
                }
                _ => ColetorError::driver(format!("{}: {}", context, err)),
            },
            CmdError::WaitTimeout => ColetorError::element_not_found(context.to_string()),
            _ => ColetorError::driver(format!("{}: {}", context, err)),
        }
    }
}

fn wd_locator(locator: &Locator) -> WdLocator<'_> {
    match locator.strategy {
        LocatorStrategy::Css => WdLocator::Css(&locator.expression),
        LocatorStrategy::XPath => WdLocator::XPath(&locator.expression),
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.client
            .goto(url)
            .await
            .map_err(|e| self.classify(url, None, e))
    }

    async fn find_element(&self, locator: &Locator, timeout: Duration) -> Result<ElementRef> {
        let element = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(wd_locator(locator))
            .await
            .map_err(|e| self.classify(&locator.to_string(), None, e))?;
        Ok(self.register(element))
    }

    async fn read_text(&self, handle: &ElementRef) -> Result<String> {
        let element = self.element(handle)?;
        element
            .text()
            .await
            .map_err(|e| self.classify("read text", Some(handle), e))
    }

    async fn read_attribute(&self, handle: &ElementRef, name: &str) -> Result<Option<String>> {
        let element = self.element(handle)?;
        element
            .attr(name)
            .await
            .map_err(|e| self.classify(name, Some(handle), e))
    }

    async fn is_displayed(&self, handle: &ElementRef) -> Result<bool> {
        let element = self.element(handle)?;
        element
            .is_displayed()
            .await
            .map_err(|e| self.classify("visibility probe", Some(handle), e))
    }

    async fn click(&self, handle: &ElementRef) -> Result<()> {
        let element = self.element(handle)?;
        element
            .click()
            .await
            .map_err(|e| self.classify("click", Some(handle), e))
    }

    async fn clear(&self, handle: &ElementRef) -> Result<()> {
        let element = self.element(handle)?;
        element
            .clear()
            .await
            .map_err(|e| self.classify("clear", Some(handle), e))
    }

    async fn type_into(&self, handle: &ElementRef, text: &str) -> Result<()> {
        let element = self.element(handle)?;
        element
            .send_keys(text)
            .await
            .map_err(|e| self.classify("send keys", Some(handle), e))
    }

    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| self.classify("execute script", None, e))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .client
            .current_url()
            .await
            .map_err(|e| self.classify("current url", None, e))?;
        Ok(url.to_string())
    }

    async fn page_source(&self) -> Result<String> {
        self.client
            .source()
            .await
            .map_err(|e| self.classify("page source", None, e))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| self.classify("screenshot", None, e))?;
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.elements.lock().unwrap().clear();
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| ColetorError::driver(format!("close session: {}", e)))
    }
}

/// Opens [`WebDriverSession`]s for the worker pool
pub struct WebDriverFactory {
    config: DriverConfig,
}

impl WebDriverFactory {
    /// Create a factory for the given driver configuration
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn create(&self) -> Result<Arc<dyn BrowserSession>> {
        let session = WebDriverSession::connect(&self.config).await?;
        Ok(Arc::new(session))
    }
}
