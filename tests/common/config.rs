//! Client construction for tests
//!
//! Retries are kept but made fast so transient-failure scenarios run in
//! milliseconds.

use std::time::Duration;
use tempfile::TempDir;
use weeb_dl::config::{DownloadConfig, RetryConfig, TransportConfig};
use weeb_dl::{Config, WeebClient};
use wiremock::MockServer;

/// Retry settings with millisecond delays and no jitter
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config pointed at `server`, downloading into `dir`
pub fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    Config {
        base_url: server.uri(),
        transport: TransportConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        retry: fast_retry(2),
        download: DownloadConfig {
            download_dir: dir.path().join("downloads"),
            page_concurrency: 4,
            chapter_concurrency: 2,
            ..Default::default()
        },
    }
}

/// Client for `server` plus the temp directory backing its downloads
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn create_test_client(server: &MockServer) -> (WeebClient, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let client = WeebClient::new(test_config(server, &dir)).expect("failed to build client");
    (client, dir)
}

/// Like [`create_test_client`], with a caller-adjusted config
pub fn create_client_with(
    server: &MockServer,
    adjust: impl FnOnce(&mut Config),
) -> (WeebClient, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let mut config = test_config(server, &dir);
    adjust(&mut config);
    let client = WeebClient::new(config).expect("failed to build client");
    (client, dir)
}
