//! Full chapter list of a series

use super::{Extractor, has_elements, selector, text_of};
use crate::error::{Error, Result};
use crate::types::{ChapterRef, SeriesId};
use scraper::Html;
use std::collections::HashSet;

const DOCUMENT: &str = "chapter_list";

/// Chapters in (season, index) order, first listed entry winning duplicates
///
/// The upstream lists newest first, so on a duplicate number the most recent
/// upload is the one kept. An empty fragment is a series with no chapters yet
/// and yields an empty list. A document with content but no chapter rows is a
/// layout change. Rows whose label carries no chapter number are skipped; the
/// listing only fails when every row is unreadable.
pub(super) fn extract(
    extractor: &Extractor,
    html: &Html,
    series_id: &SeriesId,
) -> Result<Vec<ChapterRef>> {
    let rows = selector(DOCUMENT, r#"div.flex.items-center > a[href*="/chapters/"]"#)?;
    let label = selector(DOCUMENT, "span.grow.flex.items-center.gap-2 > span")?;

    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    let mut unreadable: Option<Error> = None;
    let mut row_count = 0usize;
    for row in html.select(&rows) {
        row_count += 1;
        let href = row.value().attr("href").unwrap_or_default();
        let parsed = row
            .select(&label)
            .next()
            .map(text_of)
            .ok_or_else(|| Error::structural(DOCUMENT, format!("no label on chapter link '{href}'")))
            .and_then(|text| extractor.chapter_ref(DOCUMENT, series_id, href, &text));

        let chapter = match parsed {
            Ok(chapter) => chapter,
            Err(e) => {
                tracing::warn!(series_id = %series_id, href, error = %e, "Skipping unreadable chapter row");
                unreadable.get_or_insert(e);
                continue;
            }
        };
        if seen.insert((chapter.season, chapter.index)) {
            chapters.push(chapter);
        } else {
            tracing::debug!(
                series_id = %series_id,
                chapter = %chapter.label(),
                "Dropping duplicate chapter entry"
            );
        }
    }

    if row_count == 0 {
        if has_elements(html) {
            return Err(Error::structural(DOCUMENT, "no chapter rows in a non-empty document"));
        }
        return Ok(Vec::new());
    }
    if chapters.is_empty()
        && let Some(e) = unreadable
    {
        return Err(e);
    }

    chapters.sort();
    Ok(chapters)
}
