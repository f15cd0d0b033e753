//! Artifact assembly
//!
//! Persists fetched chapters either as one combined document (a CBZ by
//! default) or as loose image files. Every file lands through a temporary
//! sibling and a rename, so the user-visible path holds either the previous
//! content or the complete new content, never a truncated file.
//!
//! Layout under the download root:
//! - combined: `<root>/<series-slug>/<chapter-label>.<ext>`
//! - loose: `<root>/<series-slug>/<chapter-label>/<position>.<ext>`

use crate::config::ExistingArtifact;
use crate::error::{Error, Result};
use crate::types::{ArtifactForm, ChapterRef, PageFetch, PageRef, SeriesRef, missing_positions};
use rslug::slugify;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::{FileOptions, ZipWriter};

/// Turns ordered page images into one document
///
/// Implementations are pure: no network, no filesystem, no cache.
pub trait DocumentEncoder: Send + Sync {
    /// File extension of the produced document, without the dot
    fn extension(&self) -> &str;

    /// Encode pages, given in position order, into document bytes
    fn encode(&self, pages: &[(&PageRef, &[u8])]) -> Result<Vec<u8>>;
}

/// Comic book archive: an uncompressed zip of the page images
///
/// Entries are named `<position:04>.<ext>` so readers sort them correctly.
#[derive(Clone, Copy, Debug, Default)]
pub struct CbzEncoder;

impl DocumentEncoder for CbzEncoder {
    fn extension(&self) -> &str {
        "cbz"
    }

    fn encode(&self, pages: &[(&PageRef, &[u8])]) -> Result<Vec<u8>> {
        let encode_err = |e: zip::result::ZipError| Error::Encode(e.to_string());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        // Images are already compressed
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

        for (page, bytes) in pages {
            let name = format!("{:04}.{}", page.position, page.extension());
            zip.start_file(name, options).map_err(encode_err)?;
            zip.write_all(bytes)
                .map_err(|e| Error::Encode(format!("page {}: {e}", page.position)))?;
        }

        let cursor = zip.finish().map_err(encode_err)?;
        Ok(cursor.into_inner())
    }
}

/// Deterministic destination of one chapter's artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// `<root>/<series-slug>`
    pub series_dir: PathBuf,
    /// Chapter label, e.g. `12.5` or `S2_4`
    pub stem: String,
}

impl ArtifactTarget {
    /// Target for `chapter` of `series` under `root`
    pub fn new(root: &Path, series: &SeriesRef, chapter: &ChapterRef) -> Self {
        Self {
            series_dir: root.join(series_slug(series)),
            stem: chapter.label(),
        }
    }

    /// Path of the combined document with extension `ext`
    pub fn combined_path(&self, ext: &str) -> PathBuf {
        self.series_dir.join(format!("{}.{}", self.stem, ext))
    }

    /// Directory holding loose images
    pub fn loose_dir(&self) -> PathBuf {
        self.series_dir.join(&self.stem)
    }
}

/// Filesystem-safe directory name for a series: its slugified title, or the
/// slugified id when the title yields nothing
pub fn series_slug(series: &SeriesRef) -> String {
    let slug = slugify!(series.title.trim());
    if slug.is_empty() {
        slugify!(series.id.as_str())
    } else {
        slug
    }
}

/// What [`Assembler::assemble`] produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Document file (combined) or chapter directory (loose)
    pub path: PathBuf,
    /// Form persisted
    pub form: ArtifactForm,
    /// Positions now present at the destination
    pub written: Vec<u32>,
    /// Positions that could not be persisted because their fetch failed
    pub missing: Vec<u32>,
    /// True when an existing artifact was kept and nothing was written
    pub skipped: bool,
}

impl Artifact {
    /// Whether every page made it to disk
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Writes chapters to disk
#[derive(Clone)]
pub struct Assembler {
    encoder: Arc<dyn DocumentEncoder>,
    existing: ExistingArtifact,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(Arc::new(CbzEncoder))
    }
}

impl Assembler {
    /// Assembler using `encoder` for combined documents, overwriting existing
    /// artifacts
    pub fn new(encoder: Arc<dyn DocumentEncoder>) -> Self {
        Self {
            encoder,
            existing: ExistingArtifact::Overwrite,
        }
    }

    /// Set the policy for artifacts that are already present
    pub fn with_existing(mut self, existing: ExistingArtifact) -> Self {
        self.existing = existing;
        self
    }

    /// Extension of combined documents
    pub fn extension(&self) -> &str {
        self.encoder.extension()
    }

    /// Path a combined document for `target` would have
    pub fn combined_path(&self, target: &ArtifactTarget) -> PathBuf {
        target.combined_path(self.encoder.extension())
    }

    /// Whether the skip policy would leave this chapter untouched
    pub fn should_skip(&self, target: &ArtifactTarget, form: ArtifactForm) -> bool {
        self.existing == ExistingArtifact::Skip
            && form == ArtifactForm::CombinedDocument
            && self.combined_path(target).is_file()
    }

    /// Persist position-ordered page results
    ///
    /// Combined documents require every position from 0 to the last to be
    /// present and fetched; otherwise nothing is written and
    /// [`Error::IncompleteArtifact`] lists the missing positions. Loose images
    /// are written one file per fetched page and the rest are reported in
    /// [`Artifact::missing`].
    ///
    /// Blocking: call from a blocking context.
    pub fn assemble(
        &self,
        pages: &[PageFetch],
        target: &ArtifactTarget,
        form: ArtifactForm,
    ) -> Result<Artifact> {
        match form {
            ArtifactForm::CombinedDocument => self.assemble_combined(pages, target),
            ArtifactForm::LooseImages => self.assemble_loose(pages, target),
        }
    }

    fn assemble_combined(&self, pages: &[PageFetch], target: &ArtifactTarget) -> Result<Artifact> {
        let path = self.combined_path(target);
        if self.should_skip(target, ArtifactForm::CombinedDocument) {
            tracing::info!(path = %path.display(), "Combined document exists, skipping");
            return Ok(Artifact {
                path,
                form: ArtifactForm::CombinedDocument,
                written: Vec::new(),
                missing: Vec::new(),
                skipped: true,
            });
        }

        let missing = missing_positions(pages);
        if !missing.is_empty() {
            tracing::warn!(
                path = %path.display(),
                missing = ?missing,
                "Refusing to write incomplete combined document"
            );
            return Err(Error::IncompleteArtifact { missing });
        }

        let images: Vec<(&PageRef, &[u8])> = pages
            .iter()
            .filter_map(|p| p.outcome.as_ref().ok().map(|b| (&p.page, b.as_slice())))
            .collect();
        if images.is_empty() && path.is_file() {
            tracing::warn!(
                path = %path.display(),
                "Chapter has no pages, keeping existing combined document"
            );
            return Ok(Artifact {
                path,
                form: ArtifactForm::CombinedDocument,
                written: Vec::new(),
                missing: Vec::new(),
                skipped: true,
            });
        }
        let document = self.encoder.encode(&images)?;
        write_atomic(&path, &document)?;

        tracing::info!(
            path = %path.display(),
            pages = images.len(),
            bytes = document.len(),
            "Combined document written"
        );
        Ok(Artifact {
            path,
            form: ArtifactForm::CombinedDocument,
            written: images.iter().map(|(p, _)| p.position).collect(),
            missing: Vec::new(),
            skipped: false,
        })
    }

    fn assemble_loose(&self, pages: &[PageFetch], target: &ArtifactTarget) -> Result<Artifact> {
        let dir = target.loose_dir();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io_at(&dir, e))?;

        let mut written = Vec::new();
        for page in pages {
            let Ok(bytes) = &page.outcome else {
                continue;
            };
            let path = dir.join(format!("{}.{}", page.page.position, page.page.extension()));
            if self.existing == ExistingArtifact::Skip && path.is_file() {
                tracing::debug!(path = %path.display(), "Page exists, keeping it");
            } else {
                write_atomic(&path, bytes)?;
            }
            written.push(page.page.position);
        }

        let missing = missing_positions(pages);
        if missing.is_empty() {
            tracing::info!(dir = %dir.display(), pages = written.len(), "Loose images written");
        } else {
            tracing::warn!(
                dir = %dir.display(),
                written = written.len(),
                missing = ?missing,
                "Loose images written with missing pages"
            );
        }
        Ok(Artifact {
            path: dir,
            form: ArtifactForm::LooseImages,
            written,
            missing,
            skipped: false,
        })
    }
}

/// Write `bytes` to a temporary file beside `path`, then rename it into place
///
/// On any failure the temporary file is removed and `path` is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::io_at(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".weeb-dl-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| Error::io_at(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io_at(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io_at(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io_at(path, e.error))?;
    Ok(())
}
