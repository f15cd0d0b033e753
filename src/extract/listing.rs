//! Site-wide listings: search results, hot series, recently added, latest
//! updates and hot updates

use super::{Extractor, selector, text_of};
use crate::error::{Error, Result};
use crate::types::{LatestUpdate, SeriesId, SeriesRef};
use scraper::{ElementRef, Html};
use std::collections::HashMap;

/// Search hits, one per tooltip card
pub(super) fn search_results(extractor: &Extractor, html: &Html) -> Result<Vec<SeriesRef>> {
    const DOCUMENT: &str = "search_results";
    let cards = selector(DOCUMENT, "span.tooltip.tooltip-bottom")?;
    let link = selector(DOCUMENT, "a[href]")?;

    let mut series = SeriesSet::default();
    for card in html.select(&cards) {
        let Some(a) = card.select(&link).next() else {
            continue;
        };
        let title = card
            .value()
            .attr("data-tip")
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| link_title(a));
        let href = a.value().attr("href").unwrap_or_default();
        series.push(extractor.series_ref(DOCUMENT, href, title)?);
    }
    Ok(series.into_vec())
}

/// Every distinct series linked from a ranking page (hot series, recently
/// added), in page order
pub(super) fn series_links(
    extractor: &Extractor,
    html: &Html,
    document: &'static str,
) -> Result<Vec<SeriesRef>> {
    let links = selector(document, r#"a[href*="/series/"]"#)?;

    let mut series = SeriesSet::default();
    for a in html.select(&links) {
        let href = a.value().attr("href").unwrap_or_default();
        // Skip series sub-pages such as the RSS feed that carry no id segment
        let Ok(found) = extractor.series_ref(document, href, link_title(a)) else {
            tracing::debug!(document, href, "Skipping series link without id");
            continue;
        };
        series.push(found);
    }
    Ok(series.into_vec())
}

/// Latest releases: one card per chapter, titled by its `data-tip`
///
/// A card links to the series first and the chapter second.
pub(super) fn latest_updates(extractor: &Extractor, html: &Html) -> Result<Vec<LatestUpdate>> {
    const DOCUMENT: &str = "latest_updates";
    let cards = selector(DOCUMENT, "article[data-tip]")?;
    let link = selector(DOCUMENT, "a[href]")?;
    let label = selector(DOCUMENT, "div.flex.items-center.gap-2.opacity-70")?;

    let mut updates = Vec::new();
    for card in html.select(&cards) {
        let title = card.value().attr("data-tip").unwrap_or_default().trim().to_string();
        let links: Vec<ElementRef<'_>> = card.select(&link).collect();
        let [series_link, chapter_link, ..] = links.as_slice() else {
            return Err(Error::structural(
                DOCUMENT,
                format!("card '{title}' lacks series and chapter links"),
            ));
        };

        let series = extractor.series_ref(
            DOCUMENT,
            series_link.value().attr("href").unwrap_or_default(),
            title,
        )?;
        let chapter_label = chapter_link
            .select(&label)
            .next()
            .map(text_of)
            .ok_or_else(|| {
                Error::structural(DOCUMENT, format!("card '{}' has no chapter label", series.title))
            })?;
        let chapter = extractor.chapter_ref(
            DOCUMENT,
            &series.id,
            chapter_link.value().attr("href").unwrap_or_default(),
            &chapter_label,
        )?;

        updates.push(LatestUpdate { series, chapter });
    }
    Ok(updates)
}

/// Trending chapter releases
///
/// Every release is rendered twice. The desktop card links to the chapter and
/// carries two overlay lines, series title then chapter label. The mobile card
/// (`md:hidden`) links to the series. Both run in the same order. A release
/// whose label has no chapter number is skipped.
pub(super) fn hot_updates(extractor: &Extractor, html: &Html) -> Result<Vec<LatestUpdate>> {
    const DOCUMENT: &str = "hot_updates";
    let cards = selector(DOCUMENT, "article.tooltip.tooltip-bottom")?;
    let overlay = selector(DOCUMENT, "div.truncate.text-white.text-center.text-lg")?;
    let link = selector(DOCUMENT, "a[href]")?;

    let lines: Vec<String> = html.select(&overlay).map(text_of).collect();
    let mut chapter_hrefs = Vec::new();
    let mut series_hrefs = Vec::new();
    for card in html.select(&cards) {
        let Some(href) = card.select(&link).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        if card.value().classes().any(|c| c == "md:hidden") {
            series_hrefs.push(href);
        } else {
            chapter_hrefs.push(href);
        }
    }

    if series_hrefs.len() != chapter_hrefs.len() || lines.len() != 2 * chapter_hrefs.len() {
        return Err(Error::structural(
            DOCUMENT,
            format!(
                "{} chapter cards, {} series cards and {} overlay lines do not line up",
                chapter_hrefs.len(),
                series_hrefs.len(),
                lines.len()
            ),
        ));
    }

    let mut updates = Vec::new();
    for ((text, series_href), chapter_href) in lines.chunks(2).zip(series_hrefs).zip(chapter_hrefs) {
        let [title, label] = text else {
            continue;
        };
        let series = extractor.series_ref(DOCUMENT, series_href, title.clone())?;
        match extractor.chapter_ref(DOCUMENT, &series.id, chapter_href, label) {
            Ok(chapter) => updates.push(LatestUpdate { series, chapter }),
            Err(e) => {
                tracing::warn!(series_id = %series.id, error = %e, "Skipping unreadable hot update");
            }
        }
    }
    Ok(updates)
}

/// Visible link text, falling back to the alt text of a cover image
fn link_title(a: ElementRef<'_>) -> String {
    let text = text_of(a);
    if !text.is_empty() {
        return text;
    }
    a.descendants()
        .filter_map(ElementRef::wrap)
        .find_map(|e| e.value().attr("alt"))
        .map(|alt| alt.trim().to_string())
        .unwrap_or_default()
}

/// Insertion-ordered series list keyed by id
///
/// Listings link each series several times (cover and title); the first link
/// fixes the position and the first non-empty title wins.
#[derive(Default)]
struct SeriesSet {
    order: Vec<SeriesRef>,
    index: HashMap<SeriesId, usize>,
}

impl SeriesSet {
    fn push(&mut self, series: SeriesRef) {
        match self.index.get(&series.id) {
            Some(&i) => {
                let existing = &mut self.order[i];
                if existing.title.is_empty() {
                    existing.title = series.title;
                }
            }
            None => {
                self.index.insert(series.id.clone(), self.order.len());
                self.order.push(series);
            }
        }
    }

    fn into_vec(self) -> Vec<SeriesRef> {
        self.order
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::super::tests::extractor;
    use super::*;

    fn html(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn search_cards_use_tooltip_titles() {
        let doc = html(
            r#"<span class="tooltip tooltip-bottom" data-tip="One Piece">
                 <a href="https://weebcentral.com/series/01J76XY/One-Piece"><img alt="cover"></a>
               </span>
               <span class="tooltip tooltip-bottom" data-tip="One Punch-Man">
                 <a href="/series/01J77BB/One-Punch-Man">One Punch-Man</a>
               </span>
               <span class="tooltip tooltip-bottom" data-tip="No link"></span>"#,
        );

        let found = search_results(&extractor(), &doc).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_str(), "01J76XY");
        assert_eq!(found[0].title, "One Piece");
        assert_eq!(found[1].url, "https://weebcentral.com/series/01J77BB/One-Punch-Man");
    }

    #[test]
    fn empty_search_is_an_empty_list() {
        assert!(search_results(&extractor(), &html("<p>No results</p>")).unwrap().is_empty());
    }

    #[test]
    fn ranking_links_are_deduplicated_in_page_order() {
        let doc = html(
            r#"<a href="/series/B/Second"><img alt="Second"></a>
               <a href="/series/A/First"></a>
               <a href="/series/A/First">First</a>
               <a href="/series/B/Second">Second title</a>
               <a href="/about">About</a>"#,
        );

        let found = series_links(&extractor(), &doc, "hot_series").unwrap();

        let pairs: Vec<(&str, &str)> = found
            .iter()
            .map(|s| (s.id.as_str(), s.title.as_str()))
            .collect();
        assert_eq!(pairs, vec![("B", "Second"), ("A", "First")]);
    }

    #[test]
    fn latest_update_cards_pair_series_and_chapter() {
        let doc = html(
            r#"<article class="bg-base-100 flex items-center gap-4 tooltip tooltip-bottom" data-tip="One Piece">
                 <a href="https://weebcentral.com/series/01J76XY/One-Piece"><img alt="cover"></a>
                 <a href="https://weebcentral.com/chapters/01JCH1126">
                   <div class="flex items-center gap-2 opacity-70"><span>Chapter 1126</span></div>
                 </a>
               </article>
               <article class="tooltip tooltip-bottom" data-tip="Kagurabachi">
                 <a href="/series/01JKG/Kagurabachi">x</a>
                 <a href="/chapters/01JKG55">
                   <div class="flex items-center gap-2 opacity-70">Chapter 55.5</div>
                 </a>
               </article>"#,
        );

        let updates = latest_updates(&extractor(), &doc).unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].series.title, "One Piece");
        assert_eq!(updates[0].chapter.id.as_str(), "01JCH1126");
        assert_eq!(updates[0].chapter.series_id.as_str(), "01J76XY");
        assert_eq!(updates[0].chapter.label(), "1126");
        assert_eq!(updates[1].chapter.label(), "55.5");
    }

    #[test]
    fn latest_update_card_missing_chapter_link_is_a_structural_mismatch() {
        let doc = html(
            r#"<article data-tip="Broken"><a href="/series/X/Broken">Broken</a></article>"#,
        );

        let err = latest_updates(&extractor(), &doc).unwrap_err();

        assert!(err.is_structural());
    }

    fn hot_card(chapter_href: &str, series_href: &str, title: &str, label: &str) -> String {
        format!(
            r#"<article class="bg-base-100 hover:bg-base-300 md:relative hidden md:block gap-4 tooltip tooltip-bottom">
                 <a href="{chapter_href}">
                   <div class="truncate text-white text-center text-lg z-20 w-[90%]">{title}</div>
                   <div class="truncate text-white text-center text-lg z-20 w-[90%]">{label}</div>
                 </a>
               </article>
               <article class="bg-base-100 hover:bg-base-300 flex gap-4 md:hidden tooltip tooltip-bottom">
                 <a href="{series_href}">{title}</a>
               </article>"#
        )
    }

    #[test]
    fn hot_updates_pair_series_with_season_aware_chapters() {
        let doc = html(
            &[
                hot_card("/chapters/CH1126", "/series/01J76XY/One-Piece", "One Piece", "Chapter 1126"),
                hot_card("/chapters/CHS2", "/series/01JSL/Solo-Leveling", "Solo Leveling", "S2 Chapter 5"),
            ]
            .concat(),
        );

        let updates = hot_updates(&extractor(), &doc).unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].series.id.as_str(), "01J76XY");
        assert_eq!(updates[0].series.title, "One Piece");
        assert_eq!(updates[0].chapter.id.as_str(), "CH1126");
        assert_eq!(updates[0].chapter.series_id.as_str(), "01J76XY");
        assert_eq!(updates[1].chapter.season, Some(2));
        assert_eq!(updates[1].chapter.label(), "S2_5");
    }

    #[test]
    fn hot_update_without_chapter_number_is_skipped() {
        let doc = html(
            &[
                hot_card("/chapters/A", "/series/SA/A", "A", "Oneshot"),
                hot_card("/chapters/B", "/series/SB/B", "B", "Chapter 7"),
            ]
            .concat(),
        );

        let updates = hot_updates(&extractor(), &doc).unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].series.id.as_str(), "SB");
    }

    #[test]
    fn hot_update_cards_out_of_step_are_a_structural_mismatch() {
        let doc = html(
            r#"<article class="md:block tooltip tooltip-bottom"><a href="/chapters/A">
                 <div class="truncate text-white text-center text-lg">A</div>
                 <div class="truncate text-white text-center text-lg">Chapter 1</div></a></article>"#,
        );

        let err = hot_updates(&extractor(), &doc).unwrap_err();

        assert!(err.is_structural());
    }
}
