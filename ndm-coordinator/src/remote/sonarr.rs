//! Sonarr re-download flow
//!
//! The series must already be in the library. The episode files named by the
//! release are deleted (each file once, season packs share files) and a search
//! is queued for the deleted episodes, or for the whole series when nothing
//! was deleted.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

use super::{entry_matches, ArrHttp, RemoteError};
use crate::models::CatalogItem;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlternateTitle {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesStatistics {
    #[serde(default)]
    episode_file_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesEntry {
    #[serde(default)]
    id: i64,
    title: String,
    #[serde(default)]
    alternate_titles: Vec<AlternateTitle>,
    #[serde(default)]
    year: u32,
    #[serde(default)]
    statistics: Option<SeriesStatistics>,
}

impl SeriesEntry {
    fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.alternate_titles.iter().map(|t| t.title.as_str()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Episode {
    id: i64,
    season_number: u32,
    episode_number: u32,
    #[serde(default)]
    has_file: bool,
    #[serde(default)]
    episode_file_id: i64,
}

#[derive(Debug, Clone)]
pub struct SonarrClient {
    http: ArrHttp,
    delete_whole_season: bool,
}

impl SonarrClient {
    pub fn new(http: ArrHttp, delete_whole_season: bool) -> Self {
        Self {
            http,
            delete_whole_season,
        }
    }

    pub fn http(&self) -> &ArrHttp {
        &self.http
    }

    async fn find_series(&self, item: &CatalogItem) -> Result<SeriesEntry, RemoteError> {
        let results: Vec<SeriesEntry> = self
            .http
            .get_json("api/v3/series/lookup", &[("term", item.title.clone())])
            .await?;

        results
            .into_iter()
            .find(|series| series.id > 0 && entry_matches(item, series.titles(), Some(series.year)))
            .ok_or_else(|| {
                RemoteError::NotFound(format!("'{}' is not in the Sonarr library", item.display_title()))
            })
    }

    /// Episodes with files that the release covers
    fn select_episodes<'a>(&self, item: &CatalogItem, episodes: &'a [Episode]) -> Vec<&'a Episode> {
        episodes
            .iter()
            .filter(|ep| ep.has_file && ep.episode_file_id > 0)
            .filter(|ep| match &item.episodes {
                None => true,
                Some(selector) if self.delete_whole_season || selector.is_whole_season() => {
                    ep.season_number == selector.season
                }
                Some(selector) => selector.matches(ep.season_number, ep.episode_number),
            })
            .collect()
    }

    pub async fn redownload(&self, item: &CatalogItem) -> Result<(), RemoteError> {
        let series = self.find_series(item).await?;

        let episodes: Vec<Episode> = self
            .http
            .get_json("api/v3/episode", &[("seriesId", series.id.to_string())])
            .await?;

        let mut deleted_files = HashSet::new();
        let mut deleted_episodes = Vec::new();
        for episode in self.select_episodes(item, &episodes) {
            if deleted_files.insert(episode.episode_file_id) {
                self.http
                    .delete(&format!("api/v3/episodefile/{}", episode.episode_file_id))
                    .await?;
            }
            deleted_episodes.push(episode.id);
        }

        let command = if deleted_episodes.is_empty() {
            json!({ "name": "SeriesSearch", "seriesId": series.id })
        } else {
            json!({ "name": "EpisodeSearch", "episodeIds": deleted_episodes })
        };
        self.http.post_json("api/v3/command", &command).await?;

        info!(
            item_id = %item.id,
            series_id = series.id,
            deleted_files = deleted_files.len(),
            episodes = deleted_episodes.len(),
            "Sonarr search triggered"
        );

        Ok(())
    }

    pub async fn has_files(&self, item: &CatalogItem) -> Result<bool, RemoteError> {
        let series = self.find_series(item).await?;
        let current: SeriesEntry = self
            .http
            .get_json(&format!("api/v3/series/{}", series.id), &[])
            .await?;

        Ok(current
            .statistics
            .map(|s| s.episode_file_count > 0)
            .unwrap_or(false))
    }
}
