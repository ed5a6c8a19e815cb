//! One collection attempt for one target
//!
//! Navigate, search, let the challenge pass run, extract, enrich, stamp.
//! Everything after navigation is contained here: a target that yields
//! nothing produces `Ok(None)`, never an error that could take the run
//! down with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::captcha::provider::TokenProvider;
use crate::captcha::solver::{ChallengeOutcome, ChallengeSolver};
use crate::core::{
    ColetorError, Config, Enrichment, Locator, PriceRecord, Result, Target, TIMESTAMP_FORMAT,
};
use crate::driver::element::ElementHandle;
use crate::driver::session::BrowserSession;
use crate::registry::client::RegistryClient;

/// Collects a single target through one browser session
pub struct TargetVisit {
    session: Arc<dyn BrowserSession>,
    registry: Arc<RegistryClient>,
    provider: Arc<dyn TokenProvider>,
    config: Config,
}

impl TargetVisit {
    /// Bind a visit to a session and the shared lookup client
    pub fn new(
        session: Arc<dyn BrowserSession>,
        registry: Arc<RegistryClient>,
        provider: Arc<dyn TokenProvider>,
        config: Config,
    ) -> Self {
        Self {
            session,
            registry,
            provider,
            config,
        }
    }

    /// Run the attempt; recoverable failures become "no record"
    pub async fn run(&self, target: &Target) -> Result<Option<PriceRecord>> {
        match self.attempt(target).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_recoverable() => {
                warn!(
                    ean = %target.ean,
                    location = %target.location_name,
                    error = %e,
                    "target skipped"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(&self, target: &Target) -> Result<Option<PriceRecord>> {
        let selectors = &self.config.portal.selectors;
        let element_timeout = Duration::from_secs(self.config.driver.element_timeout_secs);

        let url = self.config.listing_url(&target.location_code)?;
        debug!(ean = %target.ean, url = %url, "navigating");
        self.session.navigate(&url).await?;
        // Render settle: navigation completion is not observable here.
        sleep(Duration::from_millis(self.config.portal.settle_ms)).await;

        let search = ElementHandle::new(
            self.session.clone(),
            Locator::css(&selectors.search_input),
            element_timeout,
        );
        search.send_input(&target.ean).await?;

        let submit = ElementHandle::new(
            self.session.clone(),
            Locator::css(&selectors.search_button),
            element_timeout,
        );
        submit.click().await?;

        if self.config.captcha.enabled {
            let solver = ChallengeSolver::new(
                self.session.clone(),
                self.provider.clone(),
                self.config.captcha.clone(),
            );
            // The page may still be usable after a failed pass, so every
            // outcome proceeds to extraction.
            match solver.run().await {
                ChallengeOutcome::Resolved => {}
                ChallengeOutcome::TimedOut => {
                    warn!(ean = %target.ean, "challenge acceptance timed out, extracting anyway");
                }
                ChallengeOutcome::Failed(detail) => {
                    warn!(ean = %target.ean, detail = %detail, "challenge pass failed, extracting anyway");
                }
            }
        }

        let no_results = self
            .session
            .find_element(
                &Locator::css(&selectors.no_results),
                Duration::from_secs(self.config.portal.no_results_timeout_secs),
            )
            .await;
        match no_results {
            Ok(_) => {
                info!(
                    ean = %target.ean,
                    location = %target.location_name,
                    "portal reports no results"
                );
                return Ok(None);
            }
            Err(ColetorError::ElementNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let search_timeout = Duration::from_secs(self.config.portal.search_timeout_secs);
        let price = self
            .extract_text(&selectors.price, search_timeout, target)
            .await?;
        let establishment = self
            .extract_text(&selectors.establishment, search_timeout, target)
            .await?;

        let cnpj = self.extract_cnpj(&selectors.cnpj).await;
        if cnpj.is_empty() {
            debug!(ean = %target.ean, "no registry identifier on page");
        }

        let enrichment = if self.config.registry.enabled {
            match self.registry.lookup(&cnpj).await {
                Ok(Some(enrichment)) => enrichment,
                Ok(None) => Enrichment::default(),
                Err(e) => {
                    warn!(ean = %target.ean, error = %e, "enrichment degraded to unknown");
                    Enrichment::default()
                }
            }
        } else {
            Enrichment::default()
        };

        Ok(Some(PriceRecord {
            ean: target.ean.clone(),
            description: target.description.clone(),
            price,
            collected_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            establishment,
            neighborhood: enrichment.neighborhood,
            city: enrichment.city,
            region_code: enrichment.region_code,
            cnpj,
            location_code: target.location_code.clone(),
            jurisdiction: self.config.portal.jurisdiction.clone(),
        }))
    }

    /// Read a required listing field, converting its absence into a
    /// search timeout (the results simply never rendered).
    async fn extract_text(
        &self,
        selector: &str,
        timeout: Duration,
        target: &Target,
    ) -> Result<String> {
        let handle = ElementHandle::new(self.session.clone(), Locator::css(selector), timeout);
        match handle.read_text().await {
            Ok(text) => Ok(text),
            Err(ColetorError::ElementNotFound(what)) => {
                self.dump_page(target).await;
                Err(ColetorError::search_timeout(format!(
                    "{} never appeared",
                    what
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// The identifier is optional on the page; extraction failures keep
    /// digits empty so enrichment degrades instead of aborting.
    async fn extract_cnpj(&self, selector: &str) -> String {
        let found = self
            .session
            .find_element(&Locator::css(selector), Duration::from_secs(2))
            .await;
        match found {
            Ok(element) => match self.session.read_text(&element).await {
                Ok(text) => text.chars().filter(|c| c.is_ascii_digit()).collect(),
                Err(_) => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    /// Keep the evidence when a listing came up empty-handed.
    async fn dump_page(&self, target: &Target) {
        let Some(dir) = &self.config.output.debug_dir else {
            return;
        };
        let stem = dir.join(format!("{}_{}", target.ean, target.location_code));
        match self.session.page_source().await {
            Ok(source) => {
                if let Err(e) = tokio::fs::write(stem.with_extension("html"), source).await {
                    warn!(error = %e, "could not write page dump");
                }
            }
            Err(e) => warn!(error = %e, "could not read page source"),
        }
        if let Err(e) = self.session.screenshot(&stem.with_extension("png")).await {
            warn!(error = %e, "could not write screenshot");
        }
    }
}
