//! Concurrent page fetching
//!
//! Pages of a chapter are fetched under a bounded concurrency budget. Each
//! page carries its own outcome: one page failing never stops its siblings,
//! and results are put back into position order whatever order they finish
//! in. Cancellation stops new page fetches from starting; fetches already in
//! flight run to completion.

use crate::error::Error;
use crate::transport::{ExpectedKind, Fetch};
use crate::types::{ChapterFetch, ChapterId, Event, PageFetch, PageRef};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Drives page fetches through a [`Fetch`] implementation
#[derive(Clone)]
pub struct FetchScheduler {
    fetcher: Arc<dyn Fetch>,
    page_concurrency: usize,
    events: broadcast::Sender<Event>,
}

impl FetchScheduler {
    /// Scheduler with a default page budget, publishing progress on `events`
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        page_concurrency: usize,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            fetcher,
            page_concurrency: page_concurrency.max(1),
            events,
        }
    }

    /// Fetch every page of a chapter
    ///
    /// `pages` may arrive in any order and with duplicate positions; the first
    /// occurrence of a position wins. `budget` overrides the default page
    /// concurrency for this call. The returned pages are ascending by
    /// position. An empty page list is an empty, complete chapter.
    pub async fn fetch_chapter_pages(
        &self,
        chapter_id: &ChapterId,
        pages: Vec<PageRef>,
        budget: Option<usize>,
        cancel: &CancellationToken,
    ) -> ChapterFetch {
        let pages = normalize_pages(pages);
        let concurrency = budget.unwrap_or(self.page_concurrency).max(1);

        tracing::info!(
            chapter_id = %chapter_id,
            pages = pages.len(),
            concurrency,
            "Fetching chapter pages"
        );
        self.emit(Event::ChapterStarted {
            chapter_id: chapter_id.clone(),
            pages: pages.len(),
        });

        let results = run_bounded(pages, concurrency, |page| self.fetch_page(page, cancel)).await;

        let fetch = ChapterFetch {
            chapter_id: chapter_id.clone(),
            pages: results,
        };
        let fetched = fetch.fetched_count();
        let failed = fetch.pages.len() - fetched;
        let complete = fetch.is_complete();

        if complete {
            tracing::info!(chapter_id = %chapter_id, fetched, "Chapter fetched");
        } else {
            tracing::warn!(
                chapter_id = %chapter_id,
                fetched,
                failed,
                missing = ?fetch.missing(),
                "Chapter fetched with missing pages"
            );
        }
        self.emit(Event::ChapterFetched {
            chapter_id: chapter_id.clone(),
            fetched,
            failed,
            complete,
        });

        fetch
    }

    async fn fetch_page(&self, page: PageRef, cancel: &CancellationToken) -> PageFetch {
        if cancel.is_cancelled() {
            tracing::debug!(
                chapter_id = %page.chapter_id,
                position = page.position,
                "Cancelled before start"
            );
            self.emit(Event::PageFailed {
                chapter_id: page.chapter_id.clone(),
                position: page.position,
                error: Error::Cancelled.to_string(),
            });
            return PageFetch {
                page,
                outcome: Err(Error::Cancelled),
            };
        }

        let outcome = self.fetcher.fetch(&page.url, ExpectedKind::Image).await;
        match &outcome {
            Ok(bytes) => {
                tracing::debug!(
                    chapter_id = %page.chapter_id,
                    position = page.position,
                    bytes = bytes.len(),
                    "Page fetched"
                );
                self.emit(Event::PageFetched {
                    chapter_id: page.chapter_id.clone(),
                    position: page.position,
                    bytes: bytes.len(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    chapter_id = %page.chapter_id,
                    position = page.position,
                    url = %page.url,
                    error = %e,
                    "Page fetch failed"
                );
                self.emit(Event::PageFailed {
                    chapter_id: page.chapter_id.clone(),
                    position: page.position,
                    error: e.to_string(),
                });
            }
        }
        PageFetch { page, outcome }
    }

    fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.events.send(event).ok();
    }
}

/// Keep the first page at each position, ascending by position
pub fn normalize_pages(pages: impl IntoIterator<Item = PageRef>) -> Vec<PageRef> {
    let mut seen = HashSet::new();
    let mut unique: Vec<PageRef> = pages
        .into_iter()
        .filter(|p| seen.insert(p.position))
        .collect();
    unique.sort_by_key(|p| p.position);
    unique
}

/// Run `task` over `items` with at most `concurrency` in flight, returning
/// the outputs in input order
///
/// Tasks are started lazily as slots free up, so a task can still observe
/// state (such as cancellation) at the moment it actually begins.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, concurrency: usize, task: F) -> Vec<T>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let mut indexed: Vec<(usize, T)> = stream::iter(items.into_iter().enumerate())
        .map(|(i, item)| {
            let fut = task(item);
            async move { (i, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, t)| t).collect()
}
