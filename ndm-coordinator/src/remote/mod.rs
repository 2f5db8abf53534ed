//! Remote API Client
//!
//! Triggers re-downloads in Radarr (movies) and Sonarr (series). The client is
//! stateless with respect to migration progress: it holds only its HTTP
//! connections. Retrying transient failures is the caller's job.

pub mod http;
pub mod radarr;
pub mod sonarr;

use async_trait::async_trait;
use ndm_common::AppConfig;
use thiserror::Error;

use crate::catalog::title_key;
use crate::models::{CatalogItem, Manager};

pub use http::ArrHttp;
pub use radarr::RadarrClient;
pub use sonarr::SonarrClient;

/// Failure of one remote operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// API key refused; fatal for the rest of the batch
    #[error("{manager} rejected the API key ({message})")]
    Unauthorized { manager: Manager, message: String },

    /// Item unknown to the manager
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout, 5xx or connection failure; worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any other refusal (4xx, unexpected body); not retried
    #[error("rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// No endpoint configured for the item's manager
    #[error("{0} is not configured")]
    NotConfigured(Manager),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized { .. })
    }
}

/// Operations the coordinator needs from the managers
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Delete the item's current files in its manager and start a new search
    async fn trigger_redownload(&self, item: &CatalogItem) -> Result<(), RemoteError>;

    /// Whether the manager holds files for the item again
    async fn check_present(&self, item: &CatalogItem) -> Result<bool, RemoteError>;

    /// Reachability and key check; returns the manager's version
    async fn test_connection(&self, manager: Manager) -> Result<String, RemoteError>;
}

/// Radarr + Sonarr client, dispatching on the item's manager
#[derive(Debug, Clone, Default)]
pub struct ArrClient {
    radarr: Option<RadarrClient>,
    sonarr: Option<SonarrClient>,
}

impl ArrClient {
    pub fn new(radarr: Option<RadarrClient>, sonarr: Option<SonarrClient>) -> Self {
        Self { radarr, sonarr }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        let radarr = config
            .radarr
            .as_ref()
            .map(|endpoint| ArrHttp::new(Manager::Radarr, endpoint, config.request_timeout))
            .transpose()?
            .map(RadarrClient::new);

        let sonarr = config
            .sonarr
            .as_ref()
            .map(|endpoint| ArrHttp::new(Manager::Sonarr, endpoint, config.request_timeout))
            .transpose()?
            .map(|http| SonarrClient::new(http, config.sonarr_delete_whole_season));

        Ok(Self { radarr, sonarr })
    }

    pub fn is_configured(&self, manager: Manager) -> bool {
        match manager {
            Manager::Radarr => self.radarr.is_some(),
            Manager::Sonarr => self.sonarr.is_some(),
        }
    }

    fn radarr(&self) -> Result<&RadarrClient, RemoteError> {
        self.radarr
            .as_ref()
            .ok_or(RemoteError::NotConfigured(Manager::Radarr))
    }

    fn sonarr(&self) -> Result<&SonarrClient, RemoteError> {
        self.sonarr
            .as_ref()
            .ok_or(RemoteError::NotConfigured(Manager::Sonarr))
    }
}

#[async_trait]
impl RemoteClient for ArrClient {
    async fn trigger_redownload(&self, item: &CatalogItem) -> Result<(), RemoteError> {
        match item.manager() {
            Manager::Radarr => self.radarr()?.redownload(item).await,
            Manager::Sonarr => self.sonarr()?.redownload(item).await,
        }
    }

    async fn check_present(&self, item: &CatalogItem) -> Result<bool, RemoteError> {
        match item.manager() {
            Manager::Radarr => self.radarr()?.has_files(item).await,
            Manager::Sonarr => self.sonarr()?.has_files(item).await,
        }
    }

    async fn test_connection(&self, manager: Manager) -> Result<String, RemoteError> {
        match manager {
            Manager::Radarr => self.radarr()?.http().system_version().await,
            Manager::Sonarr => self.sonarr()?.http().system_version().await,
        }
    }
}

/// Whether a manager entry is the item
///
/// Any of the entry's titles must share the item's title key; years must agree
/// when both sides know one.
pub(crate) fn entry_matches<'a>(
    item: &CatalogItem,
    titles: impl IntoIterator<Item = &'a str>,
    year: Option<u32>,
) -> bool {
    let wanted = title_key(&item.title);
    if wanted.is_empty() {
        return false;
    }

    let year_ok = match (item.year, year.filter(|y| *y > 0)) {
        (Some(a), Some(b)) => u32::from(a) == b,
        _ => true,
    };

    year_ok && titles.into_iter().any(|title| title_key(title) == wanted)
}
