//! Core types for weeb-dl

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Opaque upstream identifier of a series
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub String);

/// Opaque upstream identifier of a chapter
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(SeriesId);
string_id!(ChapterId);

/// A resolved series. Identity is the id alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesRef {
    /// Upstream id
    pub id: SeriesId,
    /// Display title
    pub title: String,
    /// Canonical series page URL
    pub url: String,
}

impl PartialEq for SeriesRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SeriesRef {}

impl std::hash::Hash for SeriesRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One entry of the latest-updates listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestUpdate {
    /// Updated series
    pub series: SeriesRef,
    /// Newly released chapter
    pub chapter: ChapterRef,
}

/// Metadata scraped from a series page
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetails {
    /// Synopsis
    pub description: String,
    /// Attribute name to value (e.g. "Author(s)" -> "Oda Eiichiro")
    pub attributes: BTreeMap<String, String>,
    /// Alternative titles
    pub aliases: BTreeSet<String>,
    /// Related series
    pub related: Vec<SeriesRef>,
}

/// Invalid chapter number text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chapter index '{0}'")]
pub struct InvalidChapterIndex(pub String);

/// Rational chapter number such as `12`, `0.5` or `110.25`
///
/// Stored as `numerator / 10^scale` with trailing fractional zeros removed,
/// so `1.50` and `1.5` are the same index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChapterIndex {
    numerator: u64,
    scale: u32,
}

impl ChapterIndex {
    /// Whole-number index
    pub fn whole(n: u64) -> Self {
        Self {
            numerator: n,
            scale: 0,
        }
    }

    /// Approximate numeric value, for range filtering
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / 10f64.powi(self.scale as i32)
    }
}

impl std::str::FromStr for ChapterIndex {
    type Err = InvalidChapterIndex;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidChapterIndex(s.to_string());
        let text = s.trim();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, f.trim_end_matches('0')),
            None => (text, ""),
        };
        if int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
            || frac_part.len() > 9
        {
            return Err(invalid());
        }
        let scale = frac_part.len() as u32;
        let digits = format!("{int_part}{frac_part}");
        let numerator = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { numerator, scale })
    }
}

impl Ord for ChapterIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as u128 * 10u128.pow(other.scale);
        let rhs = other.numerator as u128 * 10u128.pow(self.scale);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for ChapterIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ChapterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.numerator);
        }
        let divisor = 10u64.pow(self.scale);
        write!(
            f,
            "{}.{:0width$}",
            self.numerator / divisor,
            self.numerator % divisor,
            width = self.scale as usize
        )
    }
}

impl Serialize for ChapterIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChapterIndex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A chapter of a series. Sorted by (season, index); chapters without a
/// season sort before seasoned ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterRef {
    /// Owning series
    pub series_id: SeriesId,
    /// Upstream chapter id
    pub id: ChapterId,
    /// Chapter number
    pub index: ChapterIndex,
    /// Season number when the upstream labels one (`S2 Chapter 5`)
    pub season: Option<u32>,
    /// Canonical reader URL
    pub url: String,
}

impl ChapterRef {
    /// Filesystem-safe stem for this chapter's artifact: `12.5` or `S2_12.5`
    pub fn label(&self) -> String {
        match self.season {
            Some(season) => format!("S{season}_{}", self.index),
            None => self.index.to_string(),
        }
    }
}

impl Ord for ChapterRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.season
            .cmp(&other.season)
            .then_with(|| self.index.cmp(&other.index))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.url.cmp(&other.url))
            .then_with(|| self.series_id.cmp(&other.series_id))
    }
}

impl PartialOrd for ChapterRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One image of a chapter, ordered strictly by position (0-based)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    /// Owning chapter
    pub chapter_id: ChapterId,
    /// Reading position, contiguous from 0 in a complete chapter
    pub position: u32,
    /// Image URL
    pub url: String,
}

impl PageRef {
    /// File extension for the image, taken from the URL path (fallback "png")
    pub fn extension(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                let path = u.path().to_string();
                std::path::Path::new(&path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase())
            })
            .filter(|e| !e.is_empty() && e.len() <= 5 && e.bytes().all(|b| b.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "png".to_string())
    }
}

impl Ord for PageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.url.cmp(&other.url))
            .then_with(|| self.chapter_id.cmp(&other.chapter_id))
    }
}

impl PartialOrd for PageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of fetching one page's bytes
#[derive(Clone, Debug)]
pub struct PageFetch {
    /// The page that was requested
    pub page: PageRef,
    /// Image bytes, or why they could not be retrieved
    pub outcome: Result<Vec<u8>, Error>,
}

impl PageFetch {
    /// Whether the page bytes were retrieved
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Position-ordered results of a chapter fetch
#[derive(Clone, Debug)]
pub struct ChapterFetch {
    /// Chapter the pages belong to
    pub chapter_id: ChapterId,
    /// One entry per resolved page, ascending by position
    pub pages: Vec<PageFetch>,
}

impl ChapterFetch {
    /// True when every page was retrieved and positions run 0..n without gaps
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Positions that failed or are absent from the 0..=max range, ascending
    pub fn missing(&self) -> Vec<u32> {
        missing_positions(&self.pages)
    }

    /// Failed pages with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&PageRef, &Error)> {
        self.pages
            .iter()
            .filter_map(|p| p.outcome.as_ref().err().map(|e| (&p.page, e)))
    }

    /// Number of pages retrieved
    pub fn fetched_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_ok()).count()
    }
}

/// Failed positions plus holes in the 0..=max position range, ascending
pub(crate) fn missing_positions(pages: &[PageFetch]) -> Vec<u32> {
    let mut missing: BTreeSet<u32> = pages
        .iter()
        .filter(|p| !p.is_ok())
        .map(|p| p.page.position)
        .collect();
    if let Some(max) = pages.iter().map(|p| p.page.position).max() {
        let present: BTreeSet<u32> = pages.iter().map(|p| p.page.position).collect();
        missing.extend((0..=max).filter(|pos| !present.contains(pos)));
    }
    missing.into_iter().collect()
}

/// Persisted form of a chapter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactForm {
    /// One file per page in a chapter directory; partial results allowed
    LooseImages,
    /// Single archive per chapter; all pages required (default)
    #[default]
    CombinedDocument,
}

/// Progress events broadcast by [`WeebClient`](crate::WeebClient)
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Page list resolved and page fetches are about to start
    ChapterStarted {
        /// Chapter being fetched
        chapter_id: ChapterId,
        /// Number of pages to fetch
        pages: usize,
    },
    /// One page's bytes arrived
    PageFetched {
        /// Owning chapter
        chapter_id: ChapterId,
        /// Page position
        position: u32,
        /// Size of the image in bytes
        bytes: usize,
    },
    /// One page failed after retries (or was cancelled)
    PageFailed {
        /// Owning chapter
        chapter_id: ChapterId,
        /// Page position
        position: u32,
        /// Failure description
        error: String,
    },
    /// All page fetches of a chapter settled
    ChapterFetched {
        /// Chapter that was fetched
        chapter_id: ChapterId,
        /// Pages retrieved
        fetched: usize,
        /// Pages that failed
        failed: usize,
        /// Whether the chapter is complete
        complete: bool,
    },
    /// An artifact was written to its final path
    ArtifactWritten {
        /// Chapter persisted
        chapter_id: ChapterId,
        /// Final path (file for combined documents, directory for loose images)
        path: PathBuf,
        /// Form written
        form: ArtifactForm,
    },
    /// An existing artifact was kept and the chapter skipped
    ArtifactSkipped {
        /// Chapter skipped
        chapter_id: ChapterId,
        /// Existing artifact path
        path: PathBuf,
    },
}

/// Ranking window of the hot-series listing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotSeriesPeriod {
    /// Views over the last week (default)
    #[default]
    Weekly,
    /// Views over the last month
    Monthly,
    /// Views since the series was added
    AllTime,
}

impl HotSeriesPeriod {
    /// Value of the listing's `sort` query parameter
    pub fn sort_key(&self) -> &'static str {
        match self {
            HotSeriesPeriod::Weekly => "weekly_views",
            HotSeriesPeriod::Monthly => "monthly_views",
            HotSeriesPeriod::AllTime => "total_views",
        }
    }
}

/// Chapter selection by number range and season
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChapterRange {
    /// Lowest chapter number included (default 1)
    ///
    /// Prologues numbered 0 are selectable with `start: 0.0`. A negative
    /// start selects nothing.
    pub start: f64,
    /// Highest chapter number included (None = last chapter)
    pub end: Option<f64>,
    /// Restrict to one season (None = any)
    pub season: Option<u32>,
}

impl Default for ChapterRange {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: None,
            season: None,
        }
    }
}

/// Select the chapters of a sorted list that fall inside `range`
///
/// An `end` beyond the last chapter, or a negative `start`, selects nothing.
pub fn filter_chapters(chapters: &[ChapterRef], range: ChapterRange) -> Vec<ChapterRef> {
    let scoped: Vec<&ChapterRef> = chapters
        .iter()
        .filter(|c| range.season.is_none_or(|s| c.season == Some(s)))
        .collect();
    let Some(last) = scoped.iter().map(|c| c.index).max() else {
        return Vec::new();
    };
    let max = last.as_f64();
    let end = range.end.unwrap_or(max);
    if max < end || range.start < 0.0 {
        return Vec::new();
    }
    scoped
        .into_iter()
        .filter(|c| {
            let n = c.index.as_f64();
            n >= range.start && n <= end
        })
        .cloned()
        .collect()
}
