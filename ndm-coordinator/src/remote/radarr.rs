//! Radarr re-download flow
//!
//! The movie must already be in the library. Its files are deleted (the movie
//! entry is kept) and a `MoviesSearch` command is queued for it.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{entry_matches, ArrHttp, RemoteError};
use crate::models::CatalogItem;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlternateTitle {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieEntry {
    #[serde(default)]
    id: i64,
    title: String,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    alternate_titles: Vec<AlternateTitle>,
    #[serde(default)]
    year: u32,
    #[serde(default)]
    has_file: bool,
}

impl MovieEntry {
    fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str())
            .chain(self.original_title.as_deref())
            .chain(self.alternate_titles.iter().map(|t| t.title.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct MovieFile {
    id: i64,
}

#[derive(Debug, Clone)]
pub struct RadarrClient {
    http: ArrHttp,
}

impl RadarrClient {
    pub fn new(http: ArrHttp) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &ArrHttp {
        &self.http
    }

    /// Library entry for the item
    async fn find_movie(&self, item: &CatalogItem) -> Result<MovieEntry, RemoteError> {
        let results: Vec<MovieEntry> = self
            .http
            .get_json("api/v3/movie/lookup", &[("term", item.search_term())])
            .await?;

        results
            .into_iter()
            .find(|movie| movie.id > 0 && entry_matches(item, movie.titles(), Some(movie.year)))
            .ok_or_else(|| {
                RemoteError::NotFound(format!("'{}' is not in the Radarr library", item.display_title()))
            })
    }

    pub async fn redownload(&self, item: &CatalogItem) -> Result<(), RemoteError> {
        let movie = self.find_movie(item).await?;

        let files: Vec<MovieFile> = self
            .http
            .get_json("api/v3/moviefile", &[("movieId", movie.id.to_string())])
            .await?;

        for file in &files {
            self.http
                .delete(&format!("api/v3/moviefile/{}", file.id))
                .await?;
        }

        self.http
            .post_json(
                "api/v3/command",
                &json!({ "name": "MoviesSearch", "movieIds": [movie.id] }),
            )
            .await?;

        info!(
            item_id = %item.id,
            movie_id = movie.id,
            deleted_files = files.len(),
            "Radarr search triggered"
        );

        Ok(())
    }

    pub async fn has_files(&self, item: &CatalogItem) -> Result<bool, RemoteError> {
        let movie = self.find_movie(item).await?;
        let current: MovieEntry = self
            .http
            .get_json(&format!("api/v3/movie/{}", movie.id), &[])
            .await?;
        Ok(current.has_file)
    }
}
