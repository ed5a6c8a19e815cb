//! Stale-tolerant element access
//!
//! Portal pages rebuild their result list on every search, which detaches
//! any element located before the rebuild. [`ElementHandle`] owns the
//! locator and re-acquires the element when the cached reference turns out
//! to be stale, so extraction code never sees staleness at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{ColetorError, Locator, Result};
use crate::driver::session::{BrowserSession, ElementRef};

/// An element handle that re-resolves itself when the page mutates.
///
/// The underlying reference is re-acquired at most once per operation;
/// a page that keeps detaching elements faster than they can be used
/// surfaces the stale error instead of looping.
pub struct ElementHandle {
    session: Arc<dyn BrowserSession>,
    locator: Locator,
    timeout: Duration,
    cached: Mutex<Option<ElementRef>>,
}

impl ElementHandle {
    /// Create a handle; the element is located on first use
    pub fn new(session: Arc<dyn BrowserSession>, locator: Locator, timeout: Duration) -> Self {
        Self {
            session,
            locator,
            timeout,
            cached: Mutex::new(None),
        }
    }

    /// The locator this handle resolves through
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Return a live element reference, re-querying if the cached one
    /// has been detached by a page mutation.
    pub async fn resolve(&self) -> Result<ElementRef> {
        let mut cached = self.cached.lock().await;

        if let Some(element) = *cached {
            match self.session.is_displayed(&element).await {
                Ok(_) => return Ok(element),
                Err(ColetorError::StaleElement(_)) => {
                    debug!(locator = %self.locator, "stale reference, relocating");
                    *cached = None;
                }
                Err(e) => return Err(e),
            }
        }

        let element = self.session.find_element(&self.locator, self.timeout).await?;
        *cached = Some(element);
        Ok(element)
    }

    /// Drop the cached reference so the next operation re-locates
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Read the element's visible text
    pub async fn read_text(&self) -> Result<String> {
        let element = self.resolve().await?;
        match self.session.read_text(&element).await {
            Err(ColetorError::StaleElement(_)) => {
                self.invalidate().await;
                let element = self.resolve().await?;
                self.session.read_text(&element).await
            }
            other => other,
        }
    }

    /// Clear the element and type `value` into it
    pub async fn send_input(&self, value: &str) -> Result<()> {
        let element = self.resolve().await?;
        match self.fill(&element, value).await {
            Err(ColetorError::StaleElement(_)) => {
                self.invalidate().await;
                let element = self.resolve().await?;
                self.fill(&element, value).await
            }
            other => other,
        }
    }

    /// Click the element
    pub async fn click(&self) -> Result<()> {
        let element = self.resolve().await?;
        match self.session.click(&element).await {
            Err(ColetorError::StaleElement(_)) => {
                self.invalidate().await;
                let element = self.resolve().await?;
                self.session.click(&element).await
            }
            other => other,
        }
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<()> {
        self.session.clear(element).await?;
        self.session.type_into(element, value).await
    }
}
