//! Shared helpers for weeb-dl integration tests
//!
//! Every test drives a [`WeebClient`](weeb_dl::WeebClient) against a local
//! `wiremock` server standing in for the upstream site.

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use config::*;
#[allow(unused_imports)]
pub use fixtures::*;
