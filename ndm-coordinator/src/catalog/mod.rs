//! Source Catalog Reader
//!
//! Read-only access to the legacy nzbdav database. The schema belongs to the
//! legacy application, so only `DavItems.Path` and the ids of the NZB/RAR file
//! tables are queried, and no index is assumed.
//!
//! Every call opens its own connection: the file may be rewritten by the
//! legacy application between calls, and a locked or missing file fails that
//! one call with `SourceUnavailable`. Retrying is up to the caller.

pub mod release;

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::models::{CatalogFilter, CatalogItem};

pub use release::{parse_release_dir, release_to_item, title_key, ReleaseDir};

const CATALOG_QUERY: &str = r#"
    SELECT DISTINCT Path FROM DavItems
    WHERE Id IN (SELECT Id FROM DavNzbFiles UNION SELECT Id FROM DavRarFiles)
      AND Path IS NOT NULL
    ORDER BY Path
"#;

/// Lists catalog items
///
/// Finite and not restartable: each call re-reads the current source state.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn list_items(&self, filter: &CatalogFilter) -> CoordinatorResult<Vec<CatalogItem>>;
}

/// Catalog reader over the legacy SQLite file
#[derive(Debug, Clone)]
pub struct SqliteCatalogReader {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteCatalogReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(500),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_paths(&self) -> CoordinatorResult<Vec<String>> {
        if !self.path.exists() {
            return Err(CoordinatorError::SourceUnavailable(format!(
                "catalog not found: {}",
                self.path.display()
            )));
        }

        // Read-only but not immutable: the legacy app may write while we read
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .busy_timeout(self.busy_timeout);

        let mut conn = options
            .connect()
            .await
            .map_err(CoordinatorError::source_unavailable)?;

        let paths = sqlx::query_scalar::<_, String>(CATALOG_QUERY)
            .fetch_all(&mut conn)
            .await
            .map_err(CoordinatorError::source_unavailable);

        // Nothing to flush on a read-only connection
        let _ = conn.close().await;

        paths
    }
}

#[async_trait]
impl CatalogReader for SqliteCatalogReader {
    async fn list_items(&self, filter: &CatalogFilter) -> CoordinatorResult<Vec<CatalogItem>> {
        let paths = self.read_paths().await?;
        let total_paths = paths.len();
        let items = items_from_paths(paths, filter);

        debug!(
            catalog = %self.path.display(),
            paths = total_paths,
            items = items.len(),
            "Listed catalog items"
        );

        Ok(items)
    }
}

/// Collapse file paths into one item per release directory, in path order
pub fn items_from_paths<I, S>(paths: I, filter: &CatalogFilter) -> Vec<CatalogItem>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for path in paths {
        let Some(release) = parse_release_dir(path.as_ref()) else {
            continue;
        };
        if !seen.insert(release.dir.clone()) {
            continue;
        }
        if let Some(item) = release_to_item(release) {
            if filter.matches(&item) {
                items.push(item);
            }
        }
    }

    items
}
