//! # weeb-dl
//!
//! Resilient manga retrieval for WeebCentral-style sites.
//!
//! The pipeline has five parts, each behind its own module:
//! - [`transport`] - HTTP with rotating client identity, timeouts and
//!   exponential-backoff retry ([`retry`])
//! - [`extract`] - pure markup-to-record parsing; layout drift surfaces as
//!   [`Error::StructuralMismatch`], never as a network error
//! - [`cache`] - session-scoped single-flight memo of extracted records
//! - [`scheduler`] - bounded concurrent page fetching, results in position order
//! - [`assembler`] - atomic persistence as a CBZ or as loose images
//!
//! [`WeebClient`] wires them together and publishes progress [`Event`]s.
//!
//! ## Quick Start
//!
//! ```no_run
//! use weeb_dl::{ChapterRange, Config, SeriesId, SeriesRef, WeebClient, filter_chapters};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WeebClient::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let series = SeriesRef {
//!         id: SeriesId::new("01J76XY7E9FNDZ1DBBM6PBJPFK"),
//!         title: "One Piece".to_string(),
//!         url: "https://weebcentral.com/series/01J76XY7E9FNDZ1DBBM6PBJPFK/One-Piece".to_string(),
//!     };
//!     let chapters = client.list_chapters(&series.id).await?;
//!     let wanted = filter_chapters(
//!         &chapters,
//!         ChapterRange { start: 1.0, end: Some(3.0), season: None },
//!     );
//!
//!     let cancel = weeb_dl::cancel_on_shutdown_signal();
//!     for (chapter, result) in client.download_chapters(&series, &wanted, None, &cancel).await {
//!         match result {
//!             Ok(artifact) => println!("{} -> {}", chapter.label(), artifact.path.display()),
//!             Err(e) => eprintln!("{}: {e}", chapter.label()),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Chapter persistence (CBZ and loose images)
pub mod assembler;
/// Single-flight resource cache
pub mod cache;
/// Session client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Document extraction
pub mod extract;
/// Retry logic with exponential backoff
pub mod retry;
/// Concurrent page fetching
pub mod scheduler;
/// HTTP transport
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use assembler::{Artifact, ArtifactTarget, Assembler, CbzEncoder, DocumentEncoder};
pub use cache::{ResourceCache, ResourceKind};
pub use client::WeebClient;
pub use config::{Config, ExistingArtifact, IdentityRotation};
pub use error::{Error, NetworkError, Result};
pub use extract::{DocumentType, Extractor, Record};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{ExpectedKind, Fetch, HttpTransport};
pub use types::{
    ArtifactForm, ChapterFetch, ChapterId, ChapterIndex, ChapterRange, ChapterRef, Event,
    HotSeriesPeriod, LatestUpdate, PageFetch, PageRef, SeriesDetails, SeriesId, SeriesRef,
    filter_chapters,
};

use tokio_util::sync::CancellationToken;

/// Token cancelled when the process receives a termination signal
///
/// Pass it to [`WeebClient::download_chapters`] (or any other cancellable
/// call) so Ctrl+C stops new page fetches while letting in-flight ones finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a Tokio runtime.
pub fn cancel_on_shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Cancelling outstanding downloads");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
