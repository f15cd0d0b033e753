//! Chapter page lists: the reader's HTML image strip, or a JSON manifest

use super::{Extractor, selector};
use crate::error::{Error, Result};
use crate::types::{ChapterId, PageRef};
use scraper::Html;
use serde_json::Value;

const READER: &str = "page_list";
const MANIFEST: &str = "page_manifest";

/// Pages of the reader strip in position order
///
/// The images live in the reader `section`. A section without images is a
/// chapter with no pages yet; a document without the section (a challenge
/// page, a redesign) is a structural mismatch.
pub(super) fn reader(extractor: &Extractor, html: &Html, chapter_id: &ChapterId) -> Result<Vec<PageRef>> {
    let section = selector(READER, "section")?;
    let images = selector(READER, "img")?;

    let Some(strip) = html.select(&section).next() else {
        return Err(Error::structural(READER, "no reader section"));
    };

    let urls = strip.select(&images).filter_map(|img| {
        let src = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))?;
        extractor.resolve(src)
    });

    Ok(urls
        .enumerate()
        .map(|(position, url)| PageRef {
            chapter_id: chapter_id.clone(),
            position: position as u32,
            url: url.to_string(),
        })
        .collect())
}

/// Pages of a JSON manifest in position order
///
/// Duplicate positions are left in document order; the scheduler keeps the
/// first of each.
pub(super) fn manifest(extractor: &Extractor, text: &str, chapter_id: &ChapterId) -> Result<Vec<PageRef>> {
    let mut pages = from_json(extractor, text.trim_start(), chapter_id)?;
    pages.sort_by_key(|p| p.position);
    Ok(pages)
}

fn from_json(extractor: &Extractor, text: &str, chapter_id: &ChapterId) -> Result<Vec<PageRef>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::structural(MANIFEST, format!("invalid JSON: {e}")))?;

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("pages").or_else(|| map.get("images")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::structural(
                    MANIFEST,
                    "JSON object has no 'pages' or 'images' array",
                ));
            }
        },
        _ => return Err(Error::structural(MANIFEST, "JSON is neither array nor object")),
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let (src, position) = match entry {
                Value::String(src) => (src.as_str(), None),
                Value::Object(map) => {
                    let src = map
                        .get("src")
                        .or_else(|| map.get("url"))
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            Error::structural(MANIFEST, format!("entry {i} has no 'src' or 'url'"))
                        })?;
                    let position = map
                        .get("position")
                        .and_then(Value::as_u64)
                        .and_then(|p| u32::try_from(p).ok());
                    (src, position)
                }
                _ => {
                    return Err(Error::structural(
                        MANIFEST,
                        format!("entry {i} is not a URL or object"),
                    ));
                }
            };
            let url = extractor
                .resolve(src)
                .ok_or_else(|| Error::structural(MANIFEST, format!("unresolvable image '{src}'")))?;
            Ok(PageRef {
                chapter_id: chapter_id.clone(),
                position: position.unwrap_or(i as u32),
                url: url.to_string(),
            })
        })
        .collect()
}
