//! Shared fixtures for ndm-coordinator integration tests
//!
//! - `InMemoryCatalog`: catalog reader over a fixed item list
//! - `SimulatedRemote`: scripted Radarr/Sonarr outcomes with call timestamps
//! - `TestContext`: ledger in a temp dir plus a started orchestrator

#![allow(dead_code)]

use async_trait::async_trait;
use ndm_common::EventBus;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use ndm_coordinator::catalog::CatalogReader;
use ndm_coordinator::db::{open_ledger_pool, StatusLedger};
use ndm_coordinator::models::{CatalogFilter, CatalogItem, EpisodeSelector, Manager, MediaType};
use ndm_coordinator::remote::{RemoteClient, RemoteError};
use ndm_coordinator::services::{BatchOrchestrator, OrchestratorSettings};
use ndm_coordinator::{CoordinatorError, CoordinatorResult};

pub fn movie(n: usize) -> CatalogItem {
    CatalogItem {
        id: format!("/content/movies/Movie.{:03}.2001.1080p", n),
        title: format!("Movie {:03}", n),
        year: Some(2001),
        media_type: MediaType::Movie,
        category: "movies".to_string(),
        release_name: format!("Movie.{:03}.2001.1080p", n),
        episodes: None,
    }
}

pub fn episode(n: usize) -> CatalogItem {
    CatalogItem {
        id: format!("/content/tv/Show.{:03}.S01E01.720p", n),
        title: format!("Show {:03}", n),
        year: None,
        media_type: MediaType::Series,
        category: "tv".to_string(),
        release_name: format!("Show.{:03}.S01E01.720p", n),
        episodes: Some(EpisodeSelector {
            season: 1,
            episodes: vec![1],
        }),
    }
}

pub fn movies(count: usize) -> Vec<CatalogItem> {
    (1..=count).map(movie).collect()
}

/// Catalog reader over a fixed list; can be switched to "unavailable"
#[derive(Default)]
pub struct InMemoryCatalog {
    items: Vec<CatalogItem>,
    unavailable: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn list_items(&self, filter: &CatalogFilter) -> CoordinatorResult<Vec<CatalogItem>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoordinatorError::SourceUnavailable("database is locked".to_string()));
        }
        Ok(self
            .items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }
}

/// Remote client with scripted per-item outcomes
///
/// Items without a script succeed. Each trigger call is timestamped.
#[derive(Default)]
pub struct SimulatedRemote {
    scripts: Mutex<HashMap<String, VecDeque<Result<(), RemoteError>>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    present: Mutex<HashMap<String, bool>>,
    latency: Duration,
}

impl SimulatedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Outcomes returned, in order, by successive calls for `item_id`
    pub fn script(&self, item_id: &str, outcomes: Vec<Result<(), RemoteError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(item_id.to_string(), outcomes.into());
    }

    pub fn set_present(&self, item_id: &str, present: bool) {
        self.present
            .lock()
            .unwrap()
            .insert(item_id.to_string(), present);
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteClient for SimulatedRemote {
    async fn trigger_redownload(&self, item: &CatalogItem) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((item.id.clone(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(&item.id)
            .and_then(|outcomes| outcomes.pop_front())
            .unwrap_or(Ok(()))
    }

    async fn check_present(&self, item: &CatalogItem) -> Result<bool, RemoteError> {
        Ok(self
            .present
            .lock()
            .unwrap()
            .get(&item.id)
            .copied()
            .unwrap_or(false))
    }

    async fn test_connection(&self, manager: Manager) -> Result<String, RemoteError> {
        match manager {
            Manager::Radarr => Ok("5.2.6".to_string()),
            Manager::Sonarr => Err(RemoteError::NotConfigured(Manager::Sonarr)),
        }
    }
}

pub fn settings(batch_size: usize, max_batch_size: usize, api_delay: Duration) -> OrchestratorSettings {
    OrchestratorSettings {
        batch_size,
        max_batch_size,
        api_delay,
    }
}

pub fn unpaced() -> OrchestratorSettings {
    settings(10, 50, Duration::ZERO)
}

/// Temp ledger, in-memory catalog, simulated remote, started orchestrator
pub struct TestContext {
    pub dir: TempDir,
    pub ledger: StatusLedger,
    pub catalog: Arc<InMemoryCatalog>,
    pub remote: Arc<SimulatedRemote>,
    pub events: EventBus,
    pub orchestrator: BatchOrchestrator,
}

impl TestContext {
    pub async fn new(items: Vec<CatalogItem>, settings: OrchestratorSettings) -> Self {
        Self::with_remote(items, settings, SimulatedRemote::new()).await
    }

    pub async fn with_remote(
        items: Vec<CatalogItem>,
        settings: OrchestratorSettings,
        remote: SimulatedRemote,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = open_ledger_pool(&dir.path().join("status.db")).await.unwrap();
        let ledger = StatusLedger::new(pool);
        let catalog = Arc::new(InMemoryCatalog::new(items));
        let remote = Arc::new(remote);
        let events = EventBus::new(100);

        let orchestrator = BatchOrchestrator::start(
            catalog.clone(),
            ledger.clone(),
            remote.clone(),
            events.clone(),
            settings,
        )
        .await
        .unwrap();

        Self {
            dir,
            ledger,
            catalog,
            remote,
            events,
            orchestrator,
        }
    }
}
