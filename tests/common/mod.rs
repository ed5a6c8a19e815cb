//! Shared test doubles: a scripted portal, session factory, registry
//! edge, and token provider.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use coletor::captcha::TokenProvider;
use coletor::core::{ColetorError, Locator, Result};
use coletor::driver::{BrowserSession, ElementRef, SessionFactory};
use coletor::registry::{RegistryApi, RegistryResponse};

/// What the portal shows after searching for a given EAN
#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// A listing with a price, an establishment, and maybe a CNPJ
    Listing {
        price: String,
        establishment: String,
        cnpj: Option<String>,
    },
    /// The explicit "no results" marker
    NoResults,
    /// The results pane never renders
    Broken,
}

/// State shared by every session the factory opens
pub struct PortalWorld {
    outcomes: Mutex<HashMap<String, PageOutcome>>,
    pub sessions_opened: AtomicUsize,
    pub sessions_quit: AtomicUsize,
}

impl PortalWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(HashMap::new()),
            sessions_opened: AtomicUsize::new(0),
            sessions_quit: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, ean: &str, outcome: PageOutcome) {
        self.outcomes.lock().unwrap().insert(ean.to_string(), outcome);
    }

    fn outcome_for(&self, ean: &str) -> PageOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(ean)
            .cloned()
            .unwrap_or(PageOutcome::NoResults)
    }
}

const SEARCH_INPUT_ID: u64 = 1;
const SEARCH_BUTTON_ID: u64 = 2;

struct SessionState {
    current_ean: String,
    current_url: String,
    texts: HashMap<u64, String>,
    next_id: u64,
}

/// One scripted browser session against the shared world
pub struct ScriptedPortal {
    world: Arc<PortalWorld>,
    state: Mutex<SessionState>,
}

impl ScriptedPortal {
    pub fn new(world: Arc<PortalWorld>) -> Self {
        world.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Self {
            world,
            state: Mutex::new(SessionState {
                current_ean: String::new(),
                current_url: String::new(),
                texts: HashMap::new(),
                next_id: 10,
            }),
        }
    }

    fn register_text(&self, text: String) -> ElementRef {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.texts.insert(id, text);
        ElementRef::new(id)
    }
}

#[async_trait]
impl BrowserSession for ScriptedPortal {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.current_url = url.to_string();
        state.texts.clear();
        Ok(())
    }

    async fn find_element(&self, locator: &Locator, _timeout: Duration) -> Result<ElementRef> {
        let outcome = {
            let state = self.state.lock().unwrap();
            self.world.outcome_for(&state.current_ean)
        };

        match locator.expression.as_str() {
            "input[name='termo']" => Ok(ElementRef::new(SEARCH_INPUT_ID)),
            "button[type='submit']" => Ok(ElementRef::new(SEARCH_BUTTON_ID)),
            ".sem-resultados" => match outcome {
                PageOutcome::NoResults => Ok(self.register_text(String::new())),
                _ => Err(ColetorError::element_not_found(locator.to_string())),
            },
            ".produto .preco" => match outcome {
                PageOutcome::Listing { price, .. } => Ok(self.register_text(price)),
                _ => Err(ColetorError::element_not_found(locator.to_string())),
            },
            ".produto .estabelecimento" => match outcome {
                PageOutcome::Listing { establishment, .. } => {
                    Ok(self.register_text(establishment))
                }
                _ => Err(ColetorError::element_not_found(locator.to_string())),
            },
            ".produto .cnpj" => match outcome {
                PageOutcome::Listing {
                    cnpj: Some(cnpj), ..
                } => Ok(self.register_text(cnpj)),
                _ => Err(ColetorError::element_not_found(locator.to_string())),
            },
            other => Err(ColetorError::element_not_found(other.to_string())),
        }
    }

    async fn read_text(&self, element: &ElementRef) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .texts
            .get(&element.id())
            .cloned()
            .ok_or_else(|| ColetorError::stale("detached"))
    }

    async fn read_attribute(&self, _element: &ElementRef, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        if element.id() <= SEARCH_BUTTON_ID {
            return Ok(true);
        }
        if self.state.lock().unwrap().texts.contains_key(&element.id()) {
            Ok(true)
        } else {
            Err(ColetorError::stale("detached"))
        }
    }

    async fn click(&self, _element: &ElementRef) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<()> {
        if element.id() == SEARCH_INPUT_ID {
            self.state.lock().unwrap().current_ean.clear();
        }
        Ok(())
    }

    async fn type_into(&self, element: &ElementRef, text: &str) -> Result<()> {
        if element.id() == SEARCH_INPUT_ID {
            self.state.lock().unwrap().current_ean.push_str(text);
        }
        Ok(())
    }

    async fn execute_script(
        &self,
        _script: &str,
        _args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Bool(true))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok("<html></html>".to_string())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.world.sessions_quit.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens scripted sessions against one shared world
pub struct ScriptedFactory {
    pub world: Arc<PortalWorld>,
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(&self) -> Result<Arc<dyn BrowserSession>> {
        Ok(Arc::new(ScriptedPortal::new(self.world.clone())))
    }
}

/// Registry edge with one canned behavior for every identifier
pub enum ScriptedRegistry {
    AlwaysNotFound,
    Found {
        neighborhood: &'static str,
        city: &'static str,
        region_code: &'static str,
    },
}

#[async_trait]
impl RegistryApi for ScriptedRegistry {
    async fn fetch(&self, _cnpj: &str) -> Result<RegistryResponse> {
        match self {
            Self::AlwaysNotFound => Ok(RegistryResponse::NotFound),
            Self::Found {
                neighborhood,
                city,
                region_code,
            } => {
                let payload = serde_json::json!({
                    "razao_social": "Mercado Central Ltda",
                    "estabelecimento": {
                        "bairro": neighborhood,
                        "cidade": { "nome": city },
                        "estado": { "sigla": region_code },
                    }
                });
                Ok(RegistryResponse::Found(serde_json::from_value(payload)?))
            }
        }
    }
}

/// Token provider that must never be reached
pub struct UnusedProvider;

#[async_trait]
impl TokenProvider for UnusedProvider {
    async fn solve(&self, _site_key: &str, _page_url: &str) -> Result<String> {
        panic!("token provider called with challenge solving disabled");
    }
}
