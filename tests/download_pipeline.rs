//! End-to-end chapter downloads against a mock site

mod common;

use common::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weeb_dl::{ArtifactForm, ChapterRange, Error, Event, ExistingArtifact, filter_chapters};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn chapter_downloads_to_a_cbz_in_page_order() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    mount_chapter(&server, "C1", 3).await;
    let (client, dir) = create_test_client(&server);
    let mut events = client.subscribe();

    let artifact = client
        .download_chapter(&series, &chapter, None, &CancellationToken::new())
        .await
        .unwrap();

    let expected = dir.path().join("downloads").join("test-series").join("1.cbz");
    assert_eq!(artifact.path, expected);
    assert_eq!(artifact.written, vec![0, 1, 2]);
    assert!(artifact.is_complete());
    assert_eq!(
        cbz_entries(&expected),
        vec!["0000.png", "0001.png", "0002.png"]
    );
    assert_no_partial_files(&dir.path().join("downloads"));

    let written = wait_for_event(&mut events, Duration::from_secs(2), |e| {
        matches!(e, Event::ArtifactWritten { .. })
    })
    .await;
    match written {
        Event::ArtifactWritten { path, form, .. } => {
            assert_eq!(path, expected);
            assert_eq!(form, ArtifactForm::CombinedDocument);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn one_transient_page_failure_does_not_reach_the_caller() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    let paths = image_paths("C1", 3);
    mount_page_list(&server, "C1", page_list_html(&server, &paths), 1).await;
    Mock::given(method("GET"))
        .and(path(paths[1].as_str()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_images(&server, &paths).await;
    let (client, _dir) = create_test_client(&server);

    let artifact = client
        .download_chapter(&series, &chapter, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cbz_entries(&artifact.path).len(), 3);
}

#[tokio::test]
async fn combined_document_refuses_a_chapter_with_a_failed_page() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    let paths = image_paths("C1", 3);
    mount_page_list(&server, "C1", page_list_html(&server, &paths), 1).await;
    mount_failing_image(&server, &paths[1], 404).await;
    mount_images(&server, &[paths[0].clone(), paths[2].clone()]).await;
    let (client, dir) = create_test_client(&server);

    let err = client
        .download_chapter(
            &series,
            &chapter,
            Some(ArtifactForm::CombinedDocument),
            &CancellationToken::new(),
        )
        .await
        .expect_err("missing page should block the archive");

    match err {
        Error::IncompleteArtifact { missing } => assert_eq!(missing, vec![1]),
        other => panic!("expected incomplete artifact, got {other:?}"),
    }
    let cbz = dir.path().join("downloads").join("test-series").join("1.cbz");
    assert!(!cbz.exists());
    assert_no_partial_files(&dir.path().join("downloads"));
}

#[tokio::test]
async fn loose_images_keep_the_pages_that_arrived() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    let paths = image_paths("C1", 3);
    mount_page_list(&server, "C1", page_list_html(&server, &paths), 1).await;
    mount_failing_image(&server, &paths[1], 404).await;
    mount_images(&server, &[paths[0].clone(), paths[2].clone()]).await;
    let (client, _dir) = create_test_client(&server);
    let mut events = client.subscribe();

    let artifact = client
        .download_chapter(
            &series,
            &chapter,
            Some(ArtifactForm::LooseImages),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(artifact.written, vec![0, 2]);
    assert_eq!(artifact.missing, vec![1]);
    assert!(!artifact.is_complete());
    assert_eq!(file_names(&artifact.path), vec!["0.png", "2.png"]);

    let failed = wait_for_event(&mut events, Duration::from_secs(2), |e| {
        matches!(e, Event::PageFailed { .. })
    })
    .await;
    assert!(matches!(failed, Event::PageFailed { position: 1, .. }));
}

#[tokio::test]
async fn existing_archive_is_skipped_without_fetching() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    // The reader page must never be requested
    mount_page_list(&server, "C1", page_list_html(&server, &[]), 0).await;
    let (client, dir) = create_client_with(&server, |config| {
        config.download.existing = ExistingArtifact::Skip;
    });
    let existing = dir.path().join("downloads").join("test-series").join("1.cbz");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"already here").unwrap();

    let artifact = client
        .download_chapter(&series, &chapter, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(artifact.skipped);
    assert_eq!(std::fs::read(&existing).unwrap(), b"already here");
}

#[tokio::test]
async fn challenge_page_leaves_the_existing_archive_alone() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    mount_page_list(
        &server,
        "C1",
        "<html><body><h1>Just a moment...</h1></body></html>".to_string(),
        2,
    )
    .await;
    let (client, dir) = create_test_client(&server);
    let existing = dir.path().join("downloads").join("test-series").join("1.cbz");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"good archive").unwrap();

    for _ in 0..2 {
        let err = client
            .download_chapter(&series, &chapter, None, &CancellationToken::new())
            .await
            .expect_err("challenge page should fail");
        assert!(err.is_structural());
    }

    assert_eq!(std::fs::read(&existing).unwrap(), b"good archive");
    assert_no_partial_files(&dir.path().join("downloads"));
}

#[tokio::test]
async fn empty_reader_keeps_the_existing_archive() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    mount_page_list(&server, "C1", page_list_html(&server, &[]), 1).await;
    let (client, dir) = create_test_client(&server);
    let existing = dir.path().join("downloads").join("test-series").join("1.cbz");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"good archive").unwrap();

    let artifact = client
        .download_chapter(&series, &chapter, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(artifact.skipped);
    assert_eq!(std::fs::read(&existing).unwrap(), b"good archive");
}

#[tokio::test]
async fn series_download_runs_selected_chapters() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    mount_chapter_list(
        &server,
        "S1",
        chapter_list_html(
            &server,
            &[
                ("C4", "Chapter 4"),
                ("C3", "Chapter 3"),
                ("C2", "Chapter 2"),
                ("C1", "Chapter 1"),
            ],
        ),
        1,
    )
    .await;
    mount_chapter(&server, "C2", 2).await;
    mount_chapter(&server, "C3", 4).await;
    let (client, dir) = create_test_client(&server);

    let chapters = client.list_chapters(&series.id).await.unwrap();
    let wanted = filter_chapters(
        &chapters,
        ChapterRange {
            start: 2.0,
            end: Some(3.0),
            season: None,
        },
    );
    let results = client
        .download_chapters(&series, &wanted, None, &CancellationToken::new())
        .await;

    let labels: Vec<String> = results.iter().map(|(c, _)| c.label()).collect();
    assert_eq!(labels, vec!["2", "3"]);
    for (_, result) in &results {
        assert!(result.as_ref().unwrap().is_complete());
    }
    let series_dir = dir.path().join("downloads").join("test-series");
    assert_eq!(file_names(&series_dir), vec!["2.cbz", "3.cbz"]);
    assert_eq!(cbz_entries(&series_dir.join("3.cbz")).len(), 4);
}

#[tokio::test]
async fn one_broken_chapter_does_not_stop_its_siblings() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let good = chapter(&server, &series, "GOOD", "1");
    let broken = chapter(&server, &series, "BROKEN", "2");
    mount_chapter(&server, "GOOD", 2).await;
    Mock::given(method("GET"))
        .and(path("/chapters/BROKEN/images"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let (client, _dir) = create_test_client(&server);

    let results = client
        .download_chapters(&series, &[good, broken], None, &CancellationToken::new())
        .await;

    assert!(results[0].1.is_ok());
    assert!(results[1].1.as_ref().unwrap_err().is_network());
}

#[tokio::test]
async fn cancelled_batch_fetches_nothing() {
    let server = MockServer::start().await;
    let series = series(&server, "S1", "Test Series");
    let chapter = chapter(&server, &series, "C1", "1");
    mount_page_list(&server, "C1", page_list_html(&server, &[]), 0).await;
    let (client, _dir) = create_test_client(&server);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = client
        .download_chapters(&series, &[chapter], None, &cancel)
        .await;

    assert!(matches!(results[0].1, Err(Error::Cancelled)));
}
