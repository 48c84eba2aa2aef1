//! API client for the hosted relational backend.
//!
//! Tables are read through the PostgREST interface under `/rest/v1`,
//! authenticated with the project API key.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, Backend};
use crate::models::{Branch, Category, Customer, Employee, Product};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the table REST interface.
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the hosted backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<String>,
    api_key: Arc<String>,
}

impl ApiClient {
    /// Create a new API client for the project at `base_url`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(ApiError::NotConfigured.into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            api_key: Arc::new(api_key.to_string()),
        })
    }

    /// Create a client for another API key, sharing the connection pool.
    pub fn with_api_key(&self, api_key: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            api_key: Arc::new(api_key.to_string()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if !self.api_key.is_empty() {
            headers.insert("apikey", header::HeaderValue::from_str(&self.api_key)?);
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Select rows from `table`, applying PostgREST filters such as
    /// `("branch_id", "eq.b1")`.
    async fn select<T: DeserializeOwned>(&self, table: &str, filters: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.table_url(table);
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());

        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.auth_headers()?)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let rows: Vec<T> = response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse rows from {}", table))?;
                    debug!(table, rows = rows.len(), "Backend select complete");
                    return Ok(rows);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(table, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn fetch_branches(&self) -> Result<Vec<Branch>> {
        self.select("branches", &[]).await
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.select("categories", &[]).await
    }

    async fn fetch_products(&self, branch_id: &str) -> Result<Vec<Product>> {
        self.select("products", &[("branch_id", format!("eq.{}", branch_id))])
            .await
    }

    async fn fetch_employees(&self, branch_id: Option<&str>) -> Result<Vec<Employee>> {
        match branch_id {
            Some(id) => {
                self.select("employees", &[("branch_id", format!("eq.{}", id))])
                    .await
            }
            None => self.select("employees", &[]).await,
        }
    }

    async fn fetch_customers(&self) -> Result<Vec<Customer>> {
        self.select("customers", &[]).await
    }
}
