//! Challenge detection and resolution
//!
//! One invocation walks a fixed sequence: probe for the widget, pull the
//! site key, fetch a token, inject it, submit, and wait for the page to
//! accept. Absence of a challenge is the normal fast path. Exactly one
//! attempt is made per target; whether to retry is the caller's call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::captcha::provider::TokenProvider;
use crate::core::config::CaptchaConfig;
use crate::core::{ColetorError, Locator};
use crate::driver::session::BrowserSession;

/// Terminal result of one challenge pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// No challenge was present, or the page accepted the token
    Resolved,
    /// A token was injected but acceptance was never observed
    TimedOut,
    /// The attempt cannot proceed (missing site key, provider failure)
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    ChallengeDetected,
    KeyExtracted,
    Solving,
    TokenInjected,
    Submitted,
}

const INJECT_TOKEN: &str = r#"
    const field = document.querySelector(arguments[1]);
    if (!field) { return false; }
    field.value = arguments[0];
    field.dispatchEvent(new Event('input', { bubbles: true }));
    field.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
"#;

/// Drives one challenge attempt against the current page
pub struct ChallengeSolver {
    session: Arc<dyn BrowserSession>,
    provider: Arc<dyn TokenProvider>,
    config: CaptchaConfig,
}

impl ChallengeSolver {
    /// Create a solver bound to a session and a token provider
    pub fn new(
        session: Arc<dyn BrowserSession>,
        provider: Arc<dyn TokenProvider>,
        config: CaptchaConfig,
    ) -> Self {
        Self {
            session,
            provider,
            config,
        }
    }

    /// Run one full pass over the current page
    pub async fn run(&self) -> ChallengeOutcome {
        let mut state = State::Idle;
        let marker = Locator::css(&self.config.marker);
        debug!(?state, "probing for challenge");

        let widget = match self
            .session
            .find_element(&marker, Duration::from_secs(self.config.probe_timeout_secs))
            .await
        {
            Ok(widget) => widget,
            Err(ColetorError::ElementNotFound(_)) => {
                debug!("no challenge on page");
                return ChallengeOutcome::Resolved;
            }
            Err(e) => return ChallengeOutcome::Failed(format!("challenge probe: {}", e)),
        };
        state = State::ChallengeDetected;
        debug!(?state, "challenge widget present");

        let site_key = match self
            .session
            .read_attribute(&widget, &self.config.site_key_attr)
            .await
        {
            Ok(Some(key)) if !key.is_empty() => key,
            Ok(_) => {
                return ChallengeOutcome::Failed(format!(
                    "challenge widget carries no {}",
                    self.config.site_key_attr
                ))
            }
            Err(e) => return ChallengeOutcome::Failed(format!("site key read: {}", e)),
        };
        state = State::KeyExtracted;
        debug!(?state, "site key extracted");

        let page_url = match self.session.current_url().await {
            Ok(url) => url,
            Err(e) => return ChallengeOutcome::Failed(format!("current url: {}", e)),
        };

        state = State::Solving;
        debug!(?state, "requesting token");
        let token = match self.provider.solve(&site_key, &page_url).await {
            Ok(token) => token,
            Err(e) => return ChallengeOutcome::Failed(format!("token provider: {}", e)),
        };

        // The one scripted DOM mutation: fill the response field and let
        // the page's own listeners observe the change.
        let injected = self
            .session
            .execute_script(
                INJECT_TOKEN,
                vec![
                    serde_json::Value::String(token),
                    serde_json::Value::String(self.config.token_field.clone()),
                ],
            )
            .await;
        match injected {
            Ok(serde_json::Value::Bool(true)) => {}
            Ok(_) => return ChallengeOutcome::Failed("response field not found".to_string()),
            Err(e) => return ChallengeOutcome::Failed(format!("token injection: {}", e)),
        }
        state = State::TokenInjected;
        debug!(?state, "token injected");

        let submit = Locator::css(&self.config.submit);
        let clicked = match self
            .session
            .find_element(&submit, Duration::from_secs(1))
            .await
        {
            Ok(control) => self.session.click(&control).await,
            Err(e) => Err(e),
        };
        if let Err(e) = clicked {
            return ChallengeOutcome::Failed(format!("challenge submission: {}", e));
        }
        state = State::Submitted;
        debug!(?state, "challenge submitted");

        self.await_acceptance(&marker, &page_url).await
    }

    /// Wait, bounded, for evidence the page accepted the token: either
    /// the URL moved on or the widget is gone.
    async fn await_acceptance(&self, marker: &Locator, before_url: &str) -> ChallengeOutcome {
        let deadline = Instant::now() + Duration::from_secs(self.config.accept_timeout_secs);

        loop {
            if let Ok(url) = self.session.current_url().await {
                if url != before_url {
                    debug!("challenge resolved, page moved on");
                    return ChallengeOutcome::Resolved;
                }
            }
            match self
                .session
                .find_element(marker, Duration::from_millis(250))
                .await
            {
                Err(ColetorError::ElementNotFound(_)) => {
                    debug!("challenge resolved, widget gone");
                    return ChallengeOutcome::Resolved;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "acceptance probe failed"),
            }
            if Instant::now() >= deadline {
                return ChallengeOutcome::TimedOut;
            }
            sleep(Duration::from_millis(500)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::Result;
    use crate::driver::session::ElementRef;

    struct PageScript {
        has_widget: bool,
        site_key: Option<String>,
        has_token_field: bool,
        accepts: bool,
    }

    struct ChallengePage {
        script: PageScript,
        submitted: Mutex<bool>,
        injected: Mutex<Option<String>>,
    }

    impl ChallengePage {
        fn new(script: PageScript) -> Arc<Self> {
            Arc::new(Self {
                script,
                submitted: Mutex::new(false),
                injected: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl BrowserSession for ChallengePage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn find_element(
            &self,
            locator: &Locator,
            _timeout: Duration,
        ) -> Result<ElementRef> {
            match locator.expression.as_str() {
                ".g-recaptcha" => {
                    let accepted = self.script.accepts && *self.submitted.lock().unwrap();
                    if self.script.has_widget && !accepted {
                        Ok(ElementRef::new(1))
                    } else {
                        Err(ColetorError::element_not_found(locator.to_string()))
                    }
                }
                "form button[type='submit']" => Ok(ElementRef::new(2)),
                other => Err(ColetorError::element_not_found(other.to_string())),
            }
        }

        async fn read_text(&self, _element: &ElementRef) -> Result<String> {
            Ok(String::new())
        }

        async fn read_attribute(
            &self,
            _element: &ElementRef,
            _name: &str,
        ) -> Result<Option<String>> {
            Ok(self.script.site_key.clone())
        }

        async fn is_displayed(&self, _element: &ElementRef) -> Result<bool> {
            Ok(true)
        }

        async fn click(&self, element: &ElementRef) -> Result<()> {
            if element.id() == 2 {
                *self.submitted.lock().unwrap() = true;
            }
            Ok(())
        }

        async fn clear(&self, _element: &ElementRef) -> Result<()> {
            Ok(())
        }

        async fn type_into(&self, _element: &ElementRef, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn execute_script(
            &self,
            _script: &str,
            args: Vec<serde_json::Value>,
        ) -> Result<serde_json::Value> {
            if !self.script.has_token_field {
                return Ok(serde_json::Value::Bool(false));
            }
            if let Some(serde_json::Value::String(token)) = args.first() {
                *self.injected.lock().unwrap() = Some(token.clone());
            }
            Ok(serde_json::Value::Bool(true))
        }

        async fn current_url(&self) -> Result<String> {
            Ok("https://portal.test/?local=001".to_string())
        }

        async fn page_source(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn screenshot(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn quit(&self) -> Result<()> {
            Ok(())
        }
    }

    struct CannedProvider(Result<String>);

    #[async_trait]
    impl TokenProvider for CannedProvider {
        async fn solve(&self, _site_key: &str, _page_url: &str) -> Result<String> {
            match &self.0 {
                Ok(token) => Ok(token.clone()),
                Err(_) => Err(ColetorError::external("token service", "ERROR_ZERO_BALANCE")),
            }
        }
    }

    fn test_config() -> CaptchaConfig {
        CaptchaConfig {
            enabled: true,
            api_url: "https://solver.test".to_string(),
            api_key: "k".to_string(),
            probe_timeout_secs: 0,
            solve_timeout_secs: 1,
            poll_secs: 1,
            accept_timeout_secs: 0,
            marker: ".g-recaptcha".to_string(),
            site_key_attr: "data-sitekey".to_string(),
            token_field: "textarea[name='g-recaptcha-response']".to_string(),
            submit: "form button[type='submit']".to_string(),
        }
    }

    fn solver(page: Arc<ChallengePage>, provider: CannedProvider) -> ChallengeSolver {
        ChallengeSolver::new(page, Arc::new(provider), test_config())
    }

    #[tokio::test]
    async fn test_absent_challenge_resolves() {
        let page = ChallengePage::new(PageScript {
            has_widget: false,
            site_key: None,
            has_token_field: false,
            accepts: false,
        });
        let outcome = solver(page, CannedProvider(Ok("t".to_string()))).run().await;
        assert_eq!(outcome, ChallengeOutcome::Resolved);
    }

    #[tokio::test]
    async fn test_missing_site_key_fails() {
        let page = ChallengePage::new(PageScript {
            has_widget: true,
            site_key: None,
            has_token_field: true,
            accepts: true,
        });
        match solver(page, CannedProvider(Ok("t".to_string()))).run().await {
            ChallengeOutcome::Failed(detail) => assert!(detail.contains("data-sitekey")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_failure_fails_with_detail() {
        let page = ChallengePage::new(PageScript {
            has_widget: true,
            site_key: Some("6Lc-key".to_string()),
            has_token_field: true,
            accepts: true,
        });
        match solver(page, CannedProvider(Err(ColetorError::Cancelled)))
            .run()
            .await
        {
            ChallengeOutcome::Failed(detail) => assert!(detail.contains("ERROR_ZERO_BALANCE")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accepted_challenge_resolves() {
        let page = ChallengePage::new(PageScript {
            has_widget: true,
            site_key: Some("6Lc-key".to_string()),
            has_token_field: true,
            accepts: true,
        });
        let outcome = solver(page.clone(), CannedProvider(Ok("solved-token".to_string())))
            .run()
            .await;
        assert_eq!(outcome, ChallengeOutcome::Resolved);
        assert_eq!(
            page.injected.lock().unwrap().as_deref(),
            Some("solved-token")
        );
    }

    #[tokio::test]
    async fn test_unaccepted_challenge_times_out() {
        let page = ChallengePage::new(PageScript {
            has_widget: true,
            site_key: Some("6Lc-key".to_string()),
            has_token_field: true,
            accepts: false,
        });
        let outcome = solver(page, CannedProvider(Ok("t".to_string()))).run().await;
        assert_eq!(outcome, ChallengeOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_token_field_fails() {
        let page = ChallengePage::new(PageScript {
            has_widget: true,
            site_key: Some("6Lc-key".to_string()),
            has_token_field: false,
            accepts: true,
        });
        match solver(page, CannedProvider(Ok("t".to_string()))).run().await {
            ChallengeOutcome::Failed(detail) => assert!(detail.contains("response field")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
