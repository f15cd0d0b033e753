//! Document extraction
//!
//! Turns fetched bytes into typed [`Record`]s. Everything that depends on the
//! upstream markup lives under this module: when the site changes layout the
//! failure surfaces here as [`Error::StructuralMismatch`], never as a network
//! error, and the fix stays local to one submodule.
//!
//! Extraction is pure. An [`Extractor`] only knows the site root so it can
//! resolve relative links; it never performs I/O.

mod chapters;
mod listing;
mod pages;
mod series;

use crate::error::{Error, Result};
use crate::transport::ExpectedKind;
use crate::types::{
    ChapterId, ChapterIndex, ChapterRef, LatestUpdate, PageRef, SeriesDetails, SeriesId, SeriesRef,
};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Document families the extractor understands
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentType {
    /// Search result fragment
    SearchResults,
    /// A series landing page (details, attributes, aliases)
    SeriesPage,
    /// The full chapter list of a series
    ChapterList {
        /// Series the chapters belong to
        series_id: SeriesId,
    },
    /// Reader image strip of one chapter
    PageList {
        /// Chapter the pages belong to
        chapter_id: ChapterId,
    },
    /// JSON manifest of a chapter's images
    PageManifest {
        /// Chapter the pages belong to
        chapter_id: ChapterId,
    },
    /// Latest chapter releases
    LatestUpdates,
    /// Trending series ranking
    HotSeries,
    /// Trending chapter releases
    HotUpdates,
    /// Newly added series
    RecentlyAdded,
}

impl DocumentType {
    /// Stable name used in errors, logs and cache keys
    pub fn name(&self) -> &'static str {
        match self {
            DocumentType::SearchResults => "search_results",
            DocumentType::SeriesPage => "series_page",
            DocumentType::ChapterList { .. } => "chapter_list",
            DocumentType::PageList { .. } => "page_list",
            DocumentType::PageManifest { .. } => "page_manifest",
            DocumentType::LatestUpdates => "latest_updates",
            DocumentType::HotSeries => "hot_series",
            DocumentType::HotUpdates => "hot_updates",
            DocumentType::RecentlyAdded => "recently_added",
        }
    }

    /// Kind of body the transport should ask for
    pub fn expected_kind(&self) -> ExpectedKind {
        match self {
            DocumentType::PageManifest { .. } => ExpectedKind::Json,
            _ => ExpectedKind::Html,
        }
    }
}

/// Typed result of an extraction, tagged by document family
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// Search results, hot series or recently added
    SeriesList(Vec<SeriesRef>),
    /// Series page metadata
    SeriesDetails(SeriesDetails),
    /// Chapters sorted by (season, index), one per (season, index)
    Chapters(Vec<ChapterRef>),
    /// Pages sorted by position
    Pages(Vec<PageRef>),
    /// Latest or trending releases in listing order
    Updates(Vec<LatestUpdate>),
}

impl Record {
    /// Chapter list, if this record holds one
    pub fn chapters(&self) -> Option<&[ChapterRef]> {
        match self {
            Record::Chapters(c) => Some(c),
            _ => None,
        }
    }

    /// Page list, if this record holds one
    pub fn pages(&self) -> Option<&[PageRef]> {
        match self {
            Record::Pages(p) => Some(p),
            _ => None,
        }
    }

    /// Series list, if this record holds one
    pub fn series(&self) -> Option<&[SeriesRef]> {
        match self {
            Record::SeriesList(s) => Some(s),
            _ => None,
        }
    }
}

/// Markup-to-record parser bound to one site root
#[derive(Clone, Debug)]
pub struct Extractor {
    base: Url,
}

impl Extractor {
    /// Extractor resolving relative links against `base`
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Parse `base` and build an extractor
    pub fn from_base_url(base: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(base)?))
    }

    /// Site root links are resolved against
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Extract a record of the given document family from raw bytes
    pub fn extract(&self, bytes: &[u8], document: &DocumentType) -> Result<Record> {
        let text = String::from_utf8_lossy(bytes);
        let record = match document {
            DocumentType::PageList { chapter_id } => {
                let html = Html::parse_document(&text);
                Record::Pages(pages::reader(self, &html, chapter_id)?)
            }
            DocumentType::PageManifest { chapter_id } => {
                Record::Pages(pages::manifest(self, &text, chapter_id)?)
            }
            DocumentType::ChapterList { series_id } => {
                let html = Html::parse_document(&text);
                Record::Chapters(chapters::extract(self, &html, series_id)?)
            }
            DocumentType::SeriesPage => {
                let html = Html::parse_document(&text);
                Record::SeriesDetails(series::extract(self, &html)?)
            }
            DocumentType::SearchResults => {
                let html = Html::parse_document(&text);
                Record::SeriesList(listing::search_results(self, &html)?)
            }
            DocumentType::HotSeries | DocumentType::RecentlyAdded => {
                let html = Html::parse_document(&text);
                Record::SeriesList(listing::series_links(self, &html, document.name())?)
            }
            DocumentType::LatestUpdates => {
                let html = Html::parse_document(&text);
                Record::Updates(listing::latest_updates(self, &html)?)
            }
            DocumentType::HotUpdates => {
                let html = Html::parse_document(&text);
                Record::Updates(listing::hot_updates(self, &html)?)
            }
        };
        tracing::trace!(document = document.name(), "Extracted record");
        Ok(record)
    }

    /// Resolve an href found in a document
    fn resolve(&self, href: &str) -> Option<Url> {
        self.base.join(href.trim()).ok()
    }

    /// Build a series reference from a link, failing when the link carries no id
    fn series_ref(&self, document: &'static str, href: &str, title: String) -> Result<SeriesRef> {
        let url = self
            .resolve(href)
            .ok_or_else(|| Error::structural(document, format!("unresolvable link '{href}'")))?;
        let id = segment_after(&url, "series")
            .ok_or_else(|| Error::structural(document, format!("no series id in '{url}'")))?;
        Ok(SeriesRef {
            id: SeriesId::new(id),
            title,
            url: url.to_string(),
        })
    }

    /// Build a chapter reference from a link and its visible label
    fn chapter_ref(
        &self,
        document: &'static str,
        series_id: &SeriesId,
        href: &str,
        label: &str,
    ) -> Result<ChapterRef> {
        let url = self
            .resolve(href)
            .ok_or_else(|| Error::structural(document, format!("unresolvable link '{href}'")))?;
        let id = segment_after(&url, "chapters")
            .ok_or_else(|| Error::structural(document, format!("no chapter id in '{url}'")))?;
        let (season, index) = parse_chapter_label(label).ok_or_else(|| {
            Error::structural(document, format!("unrecognized chapter label '{label}'"))
        })?;
        Ok(ChapterRef {
            series_id: series_id.clone(),
            id: ChapterId::new(id),
            index,
            season,
            url: url.to_string(),
        })
    }
}

fn selector(document: &'static str, css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| Error::structural(document, format!("bad selector '{css}': {e}")))
}

/// Whether the document body holds any element at all
///
/// An empty fragment is a legitimate "nothing here" answer; anything else
/// without the expected markers means the markup changed.
fn has_elements(html: &Html) -> bool {
    Selector::parse("body *")
        .map(|any| html.select(&any).next().is_some())
        .unwrap_or(true)
}

/// Visible text of an element with whitespace collapsed
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path segment following `marker`, e.g. the id in `/series/<id>/<slug>`
fn segment_after(url: &Url, marker: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == marker)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse labels like `Chapter 12.5`, `Episode 3` or `S2 Chapter 4`
///
/// The last token is the chapter number. A leading `S<n>` token names a season.
fn parse_chapter_label(label: &str) -> Option<(Option<u32>, ChapterIndex)> {
    let tokens: Vec<&str> = label.split_whitespace().collect();
    let index = tokens.last()?.parse::<ChapterIndex>().ok()?;
    let season = match tokens.as_slice() {
        [first, _, ..] => first
            .strip_prefix('S')
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u32>().ok()),
        _ => None,
    };
    Some((season, index))
}
