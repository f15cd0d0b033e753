//! Upstream markup and mock mounting
//!
//! The markup mirrors the shapes the extractor reads: chapter rows in
//! `div.flex.items-center`, reader images as plain `<img>` elements.

use std::str::FromStr;
use std::time::Duration;
use weeb_dl::{ChapterId, ChapterIndex, ChapterRef, SeriesId, SeriesRef};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Minimal PNG signature, enough to be recognizable in written files
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Series living on the mock server
pub fn series(server: &MockServer, id: &str, title: &str) -> SeriesRef {
    SeriesRef {
        id: SeriesId::new(id),
        title: title.to_string(),
        url: format!("{}/series/{id}/{}", server.uri(), title.replace(' ', "-")),
    }
}

/// Chapter of `series` with the given number
pub fn chapter(server: &MockServer, series: &SeriesRef, id: &str, index: &str) -> ChapterRef {
    ChapterRef {
        series_id: series.id.clone(),
        id: ChapterId::new(id),
        index: ChapterIndex::from_str(index).expect("valid chapter index"),
        season: None,
        url: format!("{}/chapters/{id}", server.uri()),
    }
}

/// Full chapter list markup for `(chapter id, label)` rows, newest first
pub fn chapter_list_html(server: &MockServer, rows: &[(&str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(id, label)| {
            format!(
                r#"<div class="flex items-center">
                     <a href="{}/chapters/{id}" class="hover:bg-base-300 flex-1 flex items-center p-2">
                       <span class="grow flex items-center gap-2"><span>{label}</span></span>
                     </a>
                   </div>"#,
                server.uri()
            )
        })
        .collect();
    format!("<html><body>{rows}</body></html>")
}

/// Reader markup with one image per image path
pub fn page_list_html(server: &MockServer, image_paths: &[String]) -> String {
    let images: String = image_paths
        .iter()
        .enumerate()
        .map(|(i, p)| format!(r#"<img src="{}{p}" alt="Page {}">"#, server.uri(), i + 1))
        .collect();
    format!(r#"<html><body><section class="flex flex-col">{images}</section></body></html>"#)
}

/// Image paths for a chapter with `count` pages
pub fn image_paths(chapter_id: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| format!("/img/{chapter_id}/{n:03}.png"))
        .collect()
}

/// HTML response
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    let body: String = body.into();
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// PNG response
pub fn png() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PNG, "image/png")
}

/// Serve a series' chapter list, expecting exactly `times` requests
pub async fn mount_chapter_list(server: &MockServer, series_id: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/series/{series_id}/full-chapter-list")))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve a chapter's reader page, expecting exactly `times` requests
pub async fn mount_page_list(server: &MockServer, chapter_id: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/chapters/{chapter_id}/images")))
        .and(query_param("reading_style", "long_strip"))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve a PNG at each path
pub async fn mount_images(server: &MockServer, paths: &[String]) {
    for p in paths {
        Mock::given(method("GET"))
            .and(path(p.as_str()))
            .respond_with(png())
            .mount(server)
            .await;
    }
}

/// Serve `status` at `image_path` for every request
pub async fn mount_failing_image(server: &MockServer, image_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve a complete chapter (reader page plus images), returning the image paths
pub async fn mount_chapter(server: &MockServer, chapter_id: &str, pages: usize) -> Vec<String> {
    let paths = image_paths(chapter_id, pages);
    mount_page_list(server, chapter_id, page_list_html(server, &paths), 1).await;
    mount_images(server, &paths).await;
    paths
}

/// Serve an HTML body after `delay`, expecting exactly `times` requests
pub async fn mount_slow_html(
    server: &MockServer,
    at: &str,
    body: String,
    delay: Duration,
    times: u64,
) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(html(body).set_delay(delay))
        .expect(times)
        .mount(server)
        .await;
}
