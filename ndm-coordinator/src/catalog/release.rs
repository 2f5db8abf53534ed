//! Release name parsing
//!
//! The legacy catalog only stores file paths. Everything the managers need
//! (media type, title, year, season/episodes) is recovered from the release
//! directory name here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CatalogItem, EpisodeSelector, MediaType};

static SERIES_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(S\d{1,2}E\d{1,3}|\bS\d{1,2}\b|Season[ ._-]*\d{1,2}\b)").unwrap()
});

static SERIES_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[ ._-]*(S\d{1,2}E\d{1,3}|\bS\d{1,2}\b|Season[ ._-]*\d{1,2}\b)").unwrap()
});

static MOVIE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

static SERIES_INDICATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(dvdrip|brrip|webrip|720p|1080p|2160p|4k|x264|x265|hdtv|complete)\b").unwrap()
});

static MOVIE_INDICATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(dvdrip|brrip|webrip|720p|1080p|2160p|4k|x264|x265|hdtv|bluray|blu-ray)\b")
        .unwrap()
});

static GROUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-.]([A-Z]{2,}|[A-Z]+[0-9]+)$").unwrap());

static BRACKETED_JUNK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[[^\[\]]*(?:rip|web|dvd|blu|x264|x265|h264|h265|720p|1080p)[^\[\]]*\]").unwrap()
});

static PARENTHESIZED_JUNK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\([^()]*(?:rip|web|dvd|blu|x264|x265|h264|h265|720p|1080p)[^()]*\)").unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static EDGE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\w\s'-]+|[^\w\s'-]+$").unwrap());

static EPISODE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})").unwrap());

static EXTRA_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[ -]?E(\d{1,3})").unwrap());

static SEASON_EPISODE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Season\s*(\d{1,2})\s*Episode\s*(\d{1,3})").unwrap());

static SEASON_PACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})(?:\s|$|[^\dE])").unwrap());

static SEASON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Season\s*(\d{1,2})\b").unwrap());

/// Path trailers that sit below the real release directory
const EXTRACTION_TRAILERS: [&str; 3] = ["_extracted_", "extracted", "repack"];

const SERIES_CATEGORIES: [&str; 4] = ["tv", "series", "shows", "television"];

const MOVIE_CATEGORIES: [&str; 4] = ["movie", "movies", "films", "film"];

const UNCATEGORIZED: &str = "uncategorized";

/// Release directory recovered from a catalog file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDir {
    pub dir: String,
    pub category: String,
    pub release_name: String,
}

/// Map a catalog path to its release directory
///
/// `/content/<category>/<release>/...` keeps its category; other absolute
/// paths use their parent directory and are uncategorized. Relative or empty
/// paths have no release directory.
pub fn parse_release_dir(path: &str) -> Option<ReleaseDir> {
    if !path.starts_with('/') {
        return None;
    }

    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    if parts.len() >= 3 && parts[0] == "content" {
        return Some(ReleaseDir {
            dir: format!("/{}", parts[..3].join("/")),
            category: parts[1].to_string(),
            release_name: parts[2].to_string(),
        });
    }

    // Drop the file name, then any extraction directories above it
    if parts.len() >= 2 {
        parts.pop();
    }
    while parts.len() >= 2
        && parts
            .last()
            .is_some_and(|p| EXTRACTION_TRAILERS.contains(&p.to_lowercase().as_str()))
    {
        parts.pop();
    }

    let release_name = parts.last()?.to_string();
    Some(ReleaseDir {
        dir: format!("/{}", parts.join("/")),
        category: UNCATEGORIZED.to_string(),
        release_name,
    })
}

fn spaced(name: &str) -> String {
    name.replace(['_', '.'], " ")
}

fn is_series(release_name: &str, category: &str) -> bool {
    SERIES_CATEGORIES.contains(&category.to_lowercase().as_str())
        || SERIES_MARKERS.is_match(&spaced(release_name))
}

fn is_movie(release_name: &str, category: &str) -> bool {
    MOVIE_CATEGORIES.contains(&category.to_lowercase().as_str())
        || (MOVIE_YEAR.is_match(release_name) && !is_series(release_name, category))
}

/// Decide whether a release is a movie or a series; `None` when it is neither
pub fn classify(release_name: &str, category: &str) -> Option<MediaType> {
    if is_series(release_name, category) {
        Some(MediaType::Series)
    } else if is_movie(release_name, category) {
        Some(MediaType::Movie)
    } else {
        None
    }
}

/// Strip group tags and bracketed release junk while keeping the title intact
pub fn clean_title(title: &str) -> String {
    let cleaned = title.trim();
    let cleaned = GROUP_TAG.replace(cleaned, "");
    let cleaned = BRACKETED_JUNK.replace_all(&cleaned, "");
    let cleaned = PARENTHESIZED_JUNK.replace_all(&cleaned, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = EDGE_PUNCTUATION.replace_all(cleaned.trim(), "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Movie title and release year
///
/// The last year in the name wins, so titles that are years themselves
/// (`1917.2019.2160p`) keep their title.
pub fn extract_movie_title(release_name: &str) -> (String, Option<u16>) {
    let s = spaced(release_name);

    if let Some(year_match) = MOVIE_YEAR.find_iter(&s).last() {
        let year = year_match.as_str().parse::<u16>().ok();
        let title = clean_title(&s[..year_match.start()]);
        let year = if title == "unnamed" { None } else { year };
        return (title, year);
    }

    let title_part = match MOVIE_INDICATORS.find(&s) {
        Some(m) => &s[..m.start()],
        None => &s[..],
    };
    (clean_title(title_part), None)
}

/// Series title: everything before the season marker
pub fn extract_series_title(release_name: &str) -> String {
    let s = spaced(release_name);

    let title_part = if let Some(caps) = SERIES_TITLE.captures(&s) {
        caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string()
    } else if let Some(m) = SERIES_INDICATORS.find(&s) {
        s[..m.start()].to_string()
    } else {
        s.clone()
    };

    clean_title(&title_part)
}

/// Season/episodes named by a series release
pub fn parse_episode_selector(release_name: &str) -> Option<EpisodeSelector> {
    let normalized = spaced(release_name);

    if let Some(caps) = EPISODE_CODE.captures(&normalized) {
        let season = caps[1].parse().ok()?;
        let mut episodes = vec![caps[2].parse().ok()?];

        // Multi-episode releases: S01E01E02, S01E01-E02
        let mut rest = &normalized[caps.get(0)?.end()..];
        while let Some(extra) = EXTRA_EPISODE.captures(rest) {
            if let Ok(episode) = extra[1].parse() {
                episodes.push(episode);
            }
            rest = &rest[extra.get(0)?.end()..];
        }
        return Some(EpisodeSelector { season, episodes });
    }

    if let Some(caps) = SEASON_EPISODE_WORDS.captures(&normalized) {
        return Some(EpisodeSelector {
            season: caps[1].parse().ok()?,
            episodes: vec![caps[2].parse().ok()?],
        });
    }

    if let Some(caps) = SEASON_PACK.captures(&normalized) {
        return Some(EpisodeSelector::whole_season(caps[1].parse().ok()?));
    }

    SEASON_WORD
        .captures(&normalized)
        .and_then(|caps| caps[1].parse().ok())
        .map(EpisodeSelector::whole_season)
}

/// Matching key: lowercase ASCII alphanumerics only
pub fn title_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Build a catalog item from a release directory, if it is a movie or series
pub fn release_to_item(release: ReleaseDir) -> Option<CatalogItem> {
    let media_type = classify(&release.release_name, &release.category)?;

    let (title, year, episodes) = match media_type {
        MediaType::Movie => {
            let (title, year) = extract_movie_title(&release.release_name);
            (title, year, None)
        }
        MediaType::Series => (
            extract_series_title(&release.release_name),
            None,
            parse_episode_selector(&release.release_name),
        ),
    };

    Some(CatalogItem {
        id: release.dir,
        title,
        year,
        media_type,
        category: release.category,
        release_name: release.release_name,
        episodes,
    })
}
