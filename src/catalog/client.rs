//! HTTP client for the course-catalog RPC endpoint.
//!
//! The upstream is a form-encoded RPC (`method=getCourses&paramsCount=4&
//! param0..param3`) that answers with pseudo-JSON: single-quoted strings
//! with embedded `<br><br>` markup. The payload is repaired into real JSON
//! before parsing.
//!
//! Rate limiting is global across every dataset: at most a fixed number of
//! fetches in flight, and a minimum spacing between any two dispatches.

use super::error::FetchError;
use crate::config::DatasetKey;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;
use url::Url;

const RMI_PATH: &str = "/courses/actions/rmiMethod";

/// Configuration for the catalog client.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog application server
    pub base_url: String,
    /// Session cookie sent with every request, when the upstream needs one
    pub session_cookie: Option<String>,
    /// Pagination cap per dataset
    pub max_pages: u32,
    /// Maximum concurrent fetches, globally
    pub max_concurrent_fetches: usize,
    /// Minimum spacing between any two fetch dispatches, globally
    pub min_fetch_interval: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://appserver.fet.edu.jo:7778".to_string(),
            session_cookie: None,
            max_pages: 99,
            max_concurrent_fetches: 5,
            min_fetch_interval: Duration::from_millis(1000),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Client for fetching paginated course rows from the catalog.
pub struct CatalogClient {
    client: Client,
    endpoint: Url,
    config: CatalogConfig,
    fetch_permits: Semaphore,
    last_dispatch: Mutex<Option<Instant>>,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, FetchError> {
        let base = Url::parse(config.base_url.trim_end_matches('/'))?;
        let endpoint = base.join(RMI_PATH)?;

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint,
            fetch_permits: Semaphore::new(config.max_concurrent_fetches.max(1)),
            last_dispatch: Mutex::new(None),
            config,
        })
    }

    pub fn max_pages(&self) -> u32 {
        self.config.max_pages
    }

    /// Fetches one page of raw course rows for a dataset.
    ///
    /// An empty result means the page past the end of the dataset was
    /// reached; callers stop paginating there.
    pub async fn fetch_page(
        &self,
        dataset: &DatasetKey,
        page: u32,
    ) -> Result<Vec<Map<String, Value>>, FetchError> {
        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| FetchError::Network {
                message: "fetch limiter closed".to_string(),
            })?;
        self.pace_dispatch().await;

        debug!(dataset = %dataset.label(), page, "dispatching catalog fetch");

        let body = format!(
            "method=getCourses&paramsCount=4&param0={}&param1={}&param2={}&param3={}",
            dataset.degree.id, dataset.college.id, dataset.department.id, page
        );
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        if let Some(cookie) = &self.config.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        parse_catalog_payload(&text)
    }

    /// Enforces the minimum spacing between dispatches. The clock is held
    /// across the sleep so the spacing is global, not per caller.
    async fn pace_dispatch(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_fetch_interval {
                tokio::time::sleep(self.config.min_fetch_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Repairs the upstream pseudo-JSON and parses it into row maps.
///
/// Mirrors what the catalog frontend does: double quotes are stripped,
/// single quotes become string delimiters, and `<br><br>` line breaks turn
/// into ` - ` separators.
pub(crate) fn parse_catalog_payload(text: &str) -> Result<Vec<Map<String, Value>>, FetchError> {
    let repaired = text
        .replace('"', "")
        .replace('\'', "\"")
        .replace("<br><br>", " - ");
    let repaired = repaired.trim();
    if repaired.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(repaired).map_err(|e| FetchError::Payload {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_repair_parses_single_quoted_rows() {
        let raw = "[{'name': 'CS101', 'sectionNo': '1', 'status': '1'}]";
        let rows = parse_catalog_payload(raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "CS101");
        assert_eq!(rows[0]["status"], "1");
    }

    #[test]
    fn test_payload_repair_converts_markup_breaks() {
        let raw = "[{'name': 'CS101', 'remarks': 'first<br><br>second'}]";
        let rows = parse_catalog_payload(raw).unwrap();
        assert_eq!(rows[0]["remarks"], "first - second");
    }

    #[test]
    fn test_payload_repair_drops_stray_double_quotes() {
        let raw = "[{'name': 'Intro to \"Logic\"'}]";
        let rows = parse_catalog_payload(raw).unwrap();
        assert_eq!(rows[0]["name"], "Intro to Logic");
    }

    #[test]
    fn test_empty_payload_is_empty_page() {
        assert!(parse_catalog_payload("").unwrap().is_empty());
        assert!(parse_catalog_payload("  \n").unwrap().is_empty());
        assert!(parse_catalog_payload("[]").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_payload_is_an_error() {
        let result = parse_catalog_payload("<html>session expired</html>");
        assert!(matches!(result, Err(FetchError::Payload { .. })));
    }
}
