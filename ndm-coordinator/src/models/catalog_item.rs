//! Catalog-side types: what the legacy library says exists

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media a release holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }

    /// Manager responsible for this media type
    pub fn manager(&self) -> Manager {
        match self {
            MediaType::Movie => Manager::Radarr,
            MediaType::Series => Manager::Sonarr,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// Remote re-download manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Manager {
    Radarr,
    Sonarr,
}

impl Manager {
    pub fn as_str(&self) -> &'static str {
        match self {
            Manager::Radarr => "radarr",
            Manager::Sonarr => "sonarr",
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Manager::Radarr => f.write_str("Radarr"),
            Manager::Sonarr => f.write_str("Sonarr"),
        }
    }
}

impl FromStr for Manager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radarr" => Ok(Manager::Radarr),
            "sonarr" => Ok(Manager::Sonarr),
            other => Err(format!("unknown manager '{}'", other)),
        }
    }
}

/// Season and episodes named by a series release
///
/// An empty `episodes` list means the whole season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSelector {
    pub season: u32,
    pub episodes: Vec<u32>,
}

impl EpisodeSelector {
    pub fn whole_season(season: u32) -> Self {
        Self {
            season,
            episodes: Vec::new(),
        }
    }

    pub fn is_whole_season(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Whether an episode belongs to this selection
    pub fn matches(&self, season: u32, episode: u32) -> bool {
        season == self.season && (self.is_whole_season() || self.episodes.contains(&episode))
    }
}

/// One release in the legacy catalog
///
/// Immutable for the lifetime of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Release directory, unique per release (e.g. `/content/movies/Heat.1995.1080p`)
    pub id: String,
    /// Cleaned title used to look the item up in its manager
    pub title: String,
    /// Release year for movies, when the name carries one
    pub year: Option<u16>,
    pub media_type: MediaType,
    pub category: String,
    pub release_name: String,
    /// Season/episodes for series releases
    pub episodes: Option<EpisodeSelector>,
}

impl CatalogItem {
    pub fn manager(&self) -> Manager {
        self.media_type.manager()
    }

    /// Term sent to the manager's lookup endpoint
    pub fn search_term(&self) -> String {
        match self.year {
            Some(year) => format!("{} {}", self.title, year),
            None => self.title.clone(),
        }
    }

    /// Title as shown on the dashboard
    pub fn display_title(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

/// Narrowing applied when listing catalog items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
    pub media_type: Option<MediaType>,
    pub category: Option<String>,
    /// Case-insensitive title substring
    pub search: Option<String>,
    /// Explicit selection; catalog order is kept
    pub ids: Option<Vec<String>>,
}

impl CatalogFilter {
    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &CatalogItem) -> bool {
        if let Some(media_type) = self.media_type {
            if item.media_type != media_type {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !item.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !item.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &item.id) {
                return false;
            }
        }
        true
    }
}
