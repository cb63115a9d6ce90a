//! Prometheus counters for the scraping pipeline, exported on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    static ref CATALOG_PAGES: IntCounterVec = register_int_counter_vec!(
        "addon_catalog_pages_total",
        "Catalog listing pages fetched, by outcome",
        &["outcome"]
    )
    .unwrap();

    static ref CATALOG_ENTRIES: IntCounterVec = register_int_counter_vec!(
        "addon_catalog_entries_total",
        "Catalog entries emitted, by catalog",
        &["catalog"]
    )
    .unwrap();

    static ref STREAM_CANDIDATES: IntCounterVec = register_int_counter_vec!(
        "addon_stream_candidates_total",
        "Stream candidates produced, by host and resolution outcome",
        &["host", "outcome"]
    )
    .unwrap();

    static ref RELAY_RESPONSES: IntCounterVec = register_int_counter_vec!(
        "addon_image_relay_responses_total",
        "Image relay responses, by status",
        &["status"]
    )
    .unwrap();
}

pub fn catalog_page(outcome: &str) {
    CATALOG_PAGES.with_label_values(&[outcome]).inc();
}

pub fn catalog_entries(catalog: &str, count: usize) {
    CATALOG_ENTRIES
        .with_label_values(&[catalog])
        .inc_by(count as u64);
}

pub fn stream_candidate(host: &str, outcome: &str) {
    STREAM_CANDIDATES.with_label_values(&[host, outcome]).inc();
}

pub fn relay_response(status: u16) {
    RELAY_RESPONSES
        .with_label_values(&[&status.to_string()])
        .inc();
}
