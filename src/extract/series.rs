//! Series landing page: attributes, synopsis, aliases and related series

use super::{Extractor, selector, text_of};
use crate::error::{Error, Result};
use crate::types::SeriesDetails;
use scraper::{ElementRef, Html};

const DOCUMENT: &str = "series_page";

/// Attribute rows that are site widgets rather than metadata
const SKIPPED_ATTRIBUTES: &[&str] = &["RSS", "Track"];

/// The attribute list is required; synopsis, aliases and related series
/// default to empty when their section is absent.
pub(super) fn extract(extractor: &Extractor, html: &Html) -> Result<SeriesDetails> {
    let sections = selector(DOCUMENT, "ul.flex.flex-col.gap-4")?;
    let mut lists = html.select(&sections);

    let about = lists
        .next()
        .ok_or_else(|| Error::structural(DOCUMENT, "no attribute list"))?;

    let mut details = SeriesDetails::default();
    read_attributes(about, &mut details)?;
    if let Some(synopsis) = lists.next() {
        read_synopsis(extractor, synopsis, &mut details)?;
    }
    Ok(details)
}

fn read_attributes(about: ElementRef<'_>, details: &mut SeriesDetails) -> Result<()> {
    let labels = selector(DOCUMENT, "strong")?;
    let link = selector(DOCUMENT, "a")?;

    for strong in about.select(&labels) {
        let name = text_of(strong).trim_end_matches(':').trim().to_string();
        if name.is_empty() || SKIPPED_ATTRIBUTES.iter().any(|s| name.starts_with(s)) {
            continue;
        }

        let siblings: Vec<ElementRef<'_>> = strong
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .collect();

        let value = match siblings.iter().find(|e| e.value().name() == "a") {
            Some(a) => text_of(*a),
            None => siblings
                .iter()
                .filter(|e| e.value().name() == "span")
                .map(|span| span.select(&link).next().map_or_else(|| text_of(*span), text_of))
                .map(|v| v.trim_end_matches(',').trim().to_string())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        };

        if !value.is_empty() {
            details.attributes.insert(name, value);
        }
    }
    Ok(())
}

fn read_synopsis(
    extractor: &Extractor,
    synopsis: ElementRef<'_>,
    details: &mut SeriesDetails,
) -> Result<()> {
    let paragraph = selector(DOCUMENT, "p")?;
    let heading = selector(DOCUMENT, "strong")?;
    let items = selector(DOCUMENT, "ul > li")?;
    let link = selector(DOCUMENT, "a[href]")?;

    if let Some(p) = synopsis.select(&paragraph).next() {
        details.description = p.text().collect::<String>().trim().to_string();
    }

    for section in synopsis
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
    {
        let title = section.select(&heading).next().map(text_of).unwrap_or_default();
        let entries = section.select(&items);

        if title.starts_with("Related") {
            for entry in entries {
                let Some(a) = entry.select(&link).next() else {
                    continue;
                };
                let href = a.value().attr("href").unwrap_or_default();
                details
                    .related
                    .push(extractor.series_ref(DOCUMENT, href, text_of(entry))?);
            }
        } else {
            details.aliases.extend(
                entries
                    .map(text_of)
                    .filter(|name| !name.is_empty()),
            );
        }
    }
    Ok(())
}
