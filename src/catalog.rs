//! Catalog Loader
//!
//! Fetches the fixed standard-problem set once per session. Any
//! failure (unreachable source, malformed payload) degrades to an
//! empty catalog: no standard problems this session, never a fatal
//! error.

use serde::Deserialize;
use std::path::Path;

use crate::domain::Problem;

/// Wire shape of the catalog resource
#[derive(Debug, Deserialize)]
struct CatalogPayload {
    problems: Vec<Problem>,
}

fn mark_standard(mut problems: Vec<Problem>) -> Vec<Problem> {
    for problem in &mut problems {
        problem.is_standard = true;
    }
    problems
}

/// Load the catalog from a local file
pub fn load_from_path(path: &Path) -> Vec<Problem> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("catalog unavailable at {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    parse_catalog(&contents, &path.display().to_string())
}

/// Load the catalog from a URL
pub async fn load_from_url(url: &str) -> Vec<Problem> {
    let response = match reqwest::get(url).await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("catalog unavailable at {}: {}", url, e);
            return Vec::new();
        }
    };
    if !response.status().is_success() {
        log::warn!("catalog unavailable at {}: status {}", url, response.status());
        return Vec::new();
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("catalog unavailable at {}: {}", url, e);
            return Vec::new();
        }
    };
    parse_catalog(&body, url)
}

fn parse_catalog(contents: &str, source: &str) -> Vec<Problem> {
    match serde_json::from_str::<CatalogPayload>(contents) {
        Ok(payload) => mark_standard(payload.problems),
        Err(e) => {
            log::warn!("malformed catalog from {}: {}", source, e);
            Vec::new()
        }
    }
}
