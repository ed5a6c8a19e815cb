//! Browser session trait
//!
//! Object-safe capability seam over whatever drives the actual browser.
//! Element references are opaque handles minted by the session; the
//! session owns the mapping back to driver-native elements.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Locator, Result};

/// Opaque handle to an element previously located by a session.
///
/// A handle stays valid until the page mutates underneath it; operations
/// on a detached handle fail with `ColetorError::StaleElement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(u64);

impl ElementRef {
    /// Create a handle from a session-assigned id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The session-assigned id
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Capability trait for a single browser session
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Locate an element, waiting up to `timeout` for it to appear.
    ///
    /// Fails with `ElementNotFound` when nothing matches within the wait.
    async fn find_element(&self, locator: &Locator, timeout: Duration) -> Result<ElementRef>;

    /// Read the visible text of an element
    async fn read_text(&self, element: &ElementRef) -> Result<String>;

    /// Read an attribute of an element
    async fn read_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    /// Cheap probe used for staleness detection.
    ///
    /// Fails with `StaleElement` when the handle is detached.
    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;

    /// Click an element
    async fn click(&self, element: &ElementRef) -> Result<()>;

    /// Clear an input element
    async fn clear(&self, element: &ElementRef) -> Result<()>;

    /// Type text into an element
    async fn type_into(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// Execute a script in the page, returning its result
    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value>;

    /// Current page URL
    async fn current_url(&self) -> Result<String>;

    /// Full page source
    async fn page_source(&self) -> Result<String>;

    /// Write a screenshot of the current window to `path`
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// End the session and release the browser
    async fn quit(&self) -> Result<()>;
}

/// Creates browser sessions for workers.
///
/// Each worker in a pooled run owns one session for its whole slice of
/// targets; the factory is the only place sessions come from.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh browser session
    async fn create(&self) -> Result<Arc<dyn BrowserSession>>;
}
