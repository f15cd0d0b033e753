//! The session object tying the pipeline together
//!
//! A [`WeebClient`] owns one transport, one extractor, one resource cache and
//! one event channel. Everything fetched through it is memoized for the life
//! of the client (or until [`WeebClient::reset`]).

use crate::assembler::{Artifact, ArtifactTarget, Assembler, DocumentEncoder};
use crate::cache::{ResourceCache, ResourceKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{DocumentType, Extractor, Record};
use crate::retry::RetryPolicy;
use crate::scheduler::{FetchScheduler, normalize_pages, run_bounded};
use crate::transport::{Fetch, HttpTransport};
use crate::types::{
    ArtifactForm, ChapterFetch, ChapterId, ChapterRef, Event, HotSeriesPeriod, LatestUpdate,
    PageRef, SeriesDetails, SeriesId, SeriesRef,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Manga retrieval session
///
/// Cloning is cheap; clones share the cache, transport and event channel.
#[derive(Clone)]
pub struct WeebClient {
    config: Arc<Config>,
    base: Url,
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
    cache: ResourceCache,
    scheduler: FetchScheduler,
    assembler: Assembler,
    event_tx: broadcast::Sender<Event>,
}

impl WeebClient {
    /// Create a client backed by the HTTP transport
    ///
    /// # Example
    ///
    /// ```no_run
    /// use weeb_dl::{Config, SeriesId, WeebClient};
    ///
    /// # async fn example() -> weeb_dl::Result<()> {
    /// let client = WeebClient::new(Config::default())?;
    /// let chapters = client.list_chapters(&SeriesId::new("01J76XY7E9FNDZ1DBBM6PBJPFK")).await?;
    /// println!("{} chapters", chapters.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport =
            HttpTransport::new(&config.transport, RetryPolicy::new(config.retry.clone()))?;
        Self::build(config, Arc::new(transport))
    }

    /// Create a client over any [`Fetch`] implementation
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        config.validate()?;
        Self::build(config, fetcher)
    }

    fn build(config: Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let extractor = Extractor::new(base.clone());

        // Buffer of 1000 events so slow subscribers rarely lag
        let (event_tx, _rx) = broadcast::channel(1000);

        let scheduler = FetchScheduler::new(
            fetcher.clone(),
            config.download.page_concurrency,
            event_tx.clone(),
        );
        let assembler = Assembler::default().with_existing(config.download.existing);

        tracing::debug!(base_url = %base, "Client created");
        Ok(Self {
            config: Arc::new(config),
            base,
            fetcher,
            extractor,
            cache: ResourceCache::new(),
            scheduler,
            assembler,
            event_tx,
        })
    }

    /// Replace the combined-document encoder (CBZ by default)
    pub fn with_encoder(mut self, encoder: Arc<dyn DocumentEncoder>) -> Self {
        self.assembler = Assembler::new(encoder).with_existing(self.config.download.existing);
        self
    }

    /// Subscribe to progress events
    ///
    /// Each subscriber gets every event published after it subscribed. Slow
    /// subscribers that fall more than 1000 events behind miss the oldest.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The session cache
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Drop every cached record
    pub async fn reset(&self) {
        self.cache.clear().await;
        tracing::info!("Session cache reset");
    }

    /// Chapters of a series, ascending by (season, index)
    ///
    /// A series without chapters yields an empty list.
    pub async fn list_chapters(&self, series_id: &SeriesId) -> Result<Vec<ChapterRef>> {
        let url = self.endpoint(&["series", series_id.as_str(), "full-chapter-list"])?;
        let record = self
            .cached(
                ResourceKind::Chapters,
                series_id.as_str(),
                url,
                DocumentType::ChapterList {
                    series_id: series_id.clone(),
                },
            )
            .await?;
        expect_record(record.chapters(), "chapter_list")
    }

    /// Forget the cached chapter list of a series and fetch it again
    pub async fn refresh_chapters(&self, series_id: &SeriesId) -> Result<Vec<ChapterRef>> {
        self.cache
            .evict(ResourceKind::Chapters, series_id.as_str())
            .await;
        self.list_chapters(series_id).await
    }

    /// Pages of a chapter, ascending by position, one per position
    pub async fn list_pages(&self, chapter_id: &ChapterId) -> Result<Vec<PageRef>> {
        let mut url = self.endpoint(&["chapters", chapter_id.as_str(), "images"])?;
        url.query_pairs_mut()
            .append_pair("is_prev", "False")
            .append_pair("current_page", "1")
            .append_pair("reading_style", "long_strip");
        let record = self
            .cached(
                ResourceKind::Pages,
                chapter_id.as_str(),
                url,
                DocumentType::PageList {
                    chapter_id: chapter_id.clone(),
                },
            )
            .await?;
        let pages = expect_record(record.pages(), "page_list")?;
        Ok(normalize_pages(pages))
    }

    /// Metadata from a series page
    pub async fn series_details(&self, series: &SeriesRef) -> Result<SeriesDetails> {
        let url = Url::parse(&series.url)?;
        let record = self
            .cached(
                ResourceKind::SeriesDetails,
                series.id.as_str(),
                url,
                DocumentType::SeriesPage,
            )
            .await?;
        match record.as_ref() {
            Record::SeriesDetails(details) => Ok(details.clone()),
            _ => Err(unexpected_record("series_page")),
        }
    }

    /// Fetch and extract a caller-built URL, bypassing the cache
    ///
    /// This is the entry point for query builders: search and filter URLs are
    /// assembled by the caller and only parsed here.
    pub async fn fetch_document(&self, url: &str, document: DocumentType) -> Result<Record> {
        let bytes = self.fetcher.fetch(url, document.expected_kind()).await?;
        self.extractor.extract(&bytes, &document)
    }

    /// Series matching a caller-built search URL
    pub async fn search(&self, url: &str) -> Result<Vec<SeriesRef>> {
        match self.fetch_document(url, DocumentType::SearchResults).await? {
            Record::SeriesList(series) => Ok(series),
            _ => Err(unexpected_record("search_results")),
        }
    }

    /// One page (1-based) of the latest chapter releases
    pub async fn latest_updates(&self, page: u32) -> Result<Vec<LatestUpdate>> {
        let url = self.endpoint(&["latest-updates", &page.max(1).to_string()])?;
        match self
            .fetch_document(url.as_str(), DocumentType::LatestUpdates)
            .await?
        {
            Record::Updates(updates) => Ok(updates),
            _ => Err(unexpected_record("latest_updates")),
        }
    }

    /// Trending series for a ranking window
    pub async fn hot_series(&self, period: HotSeriesPeriod) -> Result<Vec<SeriesRef>> {
        let mut url = self.endpoint(&["hot-series"])?;
        url.query_pairs_mut().append_pair("sort", period.sort_key());
        match self
            .fetch_document(url.as_str(), DocumentType::HotSeries)
            .await?
        {
            Record::SeriesList(series) => Ok(series),
            _ => Err(unexpected_record("hot_series")),
        }
    }

    /// Trending chapter releases
    pub async fn hot_updates(&self) -> Result<Vec<LatestUpdate>> {
        let url = self.endpoint(&["hot-updates"])?;
        match self
            .fetch_document(url.as_str(), DocumentType::HotUpdates)
            .await?
        {
            Record::Updates(updates) => Ok(updates),
            _ => Err(unexpected_record("hot_updates")),
        }
    }

    /// One page (1-based) of newly added series
    pub async fn recently_added(&self, page: u32) -> Result<Vec<SeriesRef>> {
        let url = self.endpoint(&["recently-added", &page.max(1).to_string()])?;
        match self
            .fetch_document(url.as_str(), DocumentType::RecentlyAdded)
            .await?
        {
            Record::SeriesList(series) => Ok(series),
            _ => Err(unexpected_record("recently_added")),
        }
    }

    /// Fetch every page of a chapter
    ///
    /// Page-list failures (network or structural) are returned as errors.
    /// Individual page failures are not: they are recorded in the returned
    /// [`ChapterFetch`], whose pages are ascending by position. `budget`
    /// overrides the configured page concurrency.
    pub async fn fetch_chapter(
        &self,
        chapter_id: &ChapterId,
        budget: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ChapterFetch> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let pages = self.list_pages(chapter_id).await?;
        Ok(self
            .scheduler
            .fetch_chapter_pages(chapter_id, pages, budget, cancel)
            .await)
    }

    /// Write fetched pages to `target` in the requested form
    ///
    /// Runs on the blocking pool. See [`Assembler::assemble`] for the
    /// completeness rules of each form.
    pub async fn persist(
        &self,
        fetch: ChapterFetch,
        target: &ArtifactTarget,
        form: ArtifactForm,
    ) -> Result<Artifact> {
        let assembler = self.assembler.clone();
        let target_owned = target.clone();
        let chapter_id = fetch.chapter_id.clone();

        let artifact = tokio::task::spawn_blocking(move || {
            assembler.assemble(&fetch.pages, &target_owned, form)
        })
        .await
        .map_err(|e| Error::from(std::io::Error::other(format!("assembly task panicked: {e}"))))??;

        if artifact.skipped {
            self.emit_event(Event::ArtifactSkipped {
                chapter_id,
                path: artifact.path.clone(),
            });
        } else {
            self.emit_event(Event::ArtifactWritten {
                chapter_id,
                path: artifact.path.clone(),
                form,
            });
        }
        Ok(artifact)
    }

    /// Fetch one chapter and persist it under the download directory
    ///
    /// `form` defaults to the configured form. With
    /// [`ExistingArtifact::Skip`](crate::config::ExistingArtifact::Skip) an
    /// already-present combined document is kept and nothing is fetched.
    pub async fn download_chapter(
        &self,
        series: &SeriesRef,
        chapter: &ChapterRef,
        form: Option<ArtifactForm>,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let form = form.unwrap_or(self.config.download.default_form);
        let target = ArtifactTarget::new(self.config.download_dir(), series, chapter);

        if self.assembler.should_skip(&target, form) {
            let path = self.assembler.combined_path(&target);
            tracing::info!(
                chapter_id = %chapter.id,
                path = %path.display(),
                "Artifact exists, skipping chapter"
            );
            self.emit_event(Event::ArtifactSkipped {
                chapter_id: chapter.id.clone(),
                path: path.clone(),
            });
            return Ok(Artifact {
                path,
                form,
                written: Vec::new(),
                missing: Vec::new(),
                skipped: true,
            });
        }

        let fetch = self.fetch_chapter(&chapter.id, None, cancel).await?;
        self.persist(fetch, &target, form).await
    }

    /// Download several chapters, at most `chapter_concurrency` at a time
    ///
    /// Results come back in the order of `chapters`. Chapters not yet started
    /// when `cancel` fires fail with [`Error::Cancelled`].
    pub async fn download_chapters(
        &self,
        series: &SeriesRef,
        chapters: &[ChapterRef],
        form: Option<ArtifactForm>,
        cancel: &CancellationToken,
    ) -> Vec<(ChapterRef, Result<Artifact>)> {
        tracing::info!(
            series_id = %series.id,
            chapters = chapters.len(),
            concurrency = self.config.download.chapter_concurrency,
            "Downloading chapters"
        );
        run_bounded(
            chapters.to_vec(),
            self.config.download.chapter_concurrency,
            |chapter| async move {
                let result = self.download_chapter(series, &chapter, form, cancel).await;
                if let Err(e) = &result {
                    tracing::warn!(chapter_id = %chapter.id, error = %e, "Chapter download failed");
                }
                (chapter, result)
            },
        )
        .await
    }

    /// Fetch through the cache, extracting with `document`
    async fn cached(
        &self,
        kind: ResourceKind,
        id: &str,
        url: Url,
        document: DocumentType,
    ) -> Result<Arc<Record>> {
        let fetcher = Arc::clone(&self.fetcher);
        let extractor = self.extractor.clone();
        self.cache
            .get_or_fetch(kind, id, move || async move {
                let bytes = fetcher.fetch(url.as_str(), document.expected_kind()).await?;
                extractor.extract(&bytes, &document)
            })
            .await
    }

    /// Site URL with `segments` appended to the base path
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}

fn expect_record<T: Clone>(items: Option<&[T]>, document: &'static str) -> Result<Vec<T>> {
    items
        .map(<[T]>::to_vec)
        .ok_or_else(|| unexpected_record(document))
}

fn unexpected_record(document: &'static str) -> Error {
    Error::structural(document, "extractor returned a different record type")
}
