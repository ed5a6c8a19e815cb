//! Rate-limited, memoizing registry lookup client
//!
//! Wraps the public CNPJ registry behind [`RegistryApi`] so the network
//! edge is swappable in tests, caches every definitive answer for the
//! lifetime of the process, and admits requests through [`RateWindow`]
//! before they reach the wire.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::config::RegistryConfig;
use crate::core::{ColetorError, Enrichment, Result, UNKNOWN};
use crate::registry::rate::RateWindow;

/// Payload returned by the registry for a known CNPJ
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRecord {
    /// Registered company name
    #[serde(default)]
    pub razao_social: Option<String>,
    /// Establishment block with address fields
    #[serde(default)]
    pub estabelecimento: Option<Establishment>,
}

/// Establishment sub-record
#[derive(Debug, Clone, Deserialize)]
pub struct Establishment {
    #[serde(default)]
    pub bairro: Option<String>,
    #[serde(default)]
    pub cidade: Option<Cidade>,
    #[serde(default)]
    pub estado: Option<Estado>,
}

/// City sub-record
#[derive(Debug, Clone, Deserialize)]
pub struct Cidade {
    #[serde(default)]
    pub nome: Option<String>,
}

/// State sub-record
#[derive(Debug, Clone, Deserialize)]
pub struct Estado {
    #[serde(default)]
    pub sigla: Option<String>,
}

impl RegistryRecord {
    /// Flatten the nested address into enrichment fields, defaulting
    /// each missing sub-field individually.
    pub fn enrichment(&self) -> Enrichment {
        let est = self.estabelecimento.as_ref();
        Enrichment {
            neighborhood: est
                .and_then(|e| e.bairro.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            city: est
                .and_then(|e| e.cidade.as_ref())
                .and_then(|c| c.nome.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            region_code: est
                .and_then(|e| e.estado.as_ref())
                .and_then(|s| s.sigla.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// Definitive answers the registry can give for an identifier
#[derive(Debug, Clone)]
pub enum RegistryResponse {
    /// The identifier is registered
    Found(RegistryRecord),
    /// The identifier definitively does not exist
    NotFound,
}

/// Network edge of the lookup client
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Fetch one identifier; transient failures are errors, a 404 is a
    /// definitive [`RegistryResponse::NotFound`].
    async fn fetch(&self, cnpj: &str) -> Result<RegistryResponse>;
}

/// HTTP implementation against the public registry
pub struct HttpRegistryApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRegistryApi {
    /// Build the API client from configuration
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RegistryApi for HttpRegistryApi {
    async fn fetch(&self, cnpj: &str) -> Result<RegistryResponse> {
        let url = format!("{}/{}", self.base_url, cnpj);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ColetorError::external("registry", e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let record: RegistryRecord = response
                    .json()
                    .await
                    .map_err(|e| ColetorError::external("registry", e.to_string()))?;
                Ok(RegistryResponse::Found(record))
            }
            StatusCode::NOT_FOUND => Ok(RegistryResponse::NotFound),
            status => Err(ColetorError::external(
                "registry",
                format!("unexpected status {} for {}", status, cnpj),
            )),
        }
    }
}

/// Rate-limited lookup client shared by all workers.
///
/// The cache and the rate window have separate locks, and neither is
/// held across an await: a caller sleeping out the quota never blocks
/// cache hits for other identifiers.
pub struct RegistryClient {
    api: Box<dyn RegistryApi>,
    cache: Mutex<HashMap<String, Option<Enrichment>>>,
    window: RateWindow,
}

impl RegistryClient {
    /// Create a client over the given API edge
    pub fn new(api: Box<dyn RegistryApi>, config: &RegistryConfig) -> Self {
        Self {
            api,
            cache: Mutex::new(HashMap::new()),
            window: RateWindow::new(config.quota, Duration::from_secs(config.window_secs)),
        }
    }

    /// Look an identifier up, going to the network at most once per
    /// identifier for the lifetime of the client.
    ///
    /// `Ok(None)` means "no data": an empty identifier, or one the
    /// registry definitively does not know. Transient failures surface
    /// as recoverable errors and are never cached.
    pub async fn lookup(&self, cnpj: &str) -> Result<Option<Enrichment>> {
        if cnpj.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cached(cnpj) {
            debug!(cnpj, "registry cache hit");
            return Ok(cached);
        }

        self.window.admit().await;

        // A concurrent lookup may have landed while we waited for quota.
        if let Some(cached) = self.cached(cnpj) {
            return Ok(cached);
        }

        match self.api.fetch(cnpj).await {
            Ok(RegistryResponse::Found(record)) => {
                let enrichment = record.enrichment();
                self.store(cnpj, Some(enrichment.clone()));
                Ok(Some(enrichment))
            }
            Ok(RegistryResponse::NotFound) => {
                debug!(cnpj, "registry has no record");
                self.store(cnpj, None);
                Ok(None)
            }
            Err(e) => {
                warn!(cnpj, error = %e, "registry lookup failed");
                Err(e)
            }
        }
    }

    fn cached(&self, cnpj: &str) -> Option<Option<Enrichment>> {
        self.cache.lock().unwrap().get(cnpj).cloned()
    }

    fn store(&self, cnpj: &str, value: Option<Enrichment>) {
        self.cache.lock().unwrap().insert(cnpj.to_string(), value);
    }
}
