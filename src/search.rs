/*
 * @file search.rs
 * @brief Web search provider
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Web search provider used by the `google_search` tool.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SearchError;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub description: String,
    pub url: String,
}

impl SearchHit {
    /// Formats the hit as the three-line block handed back to the model.
    pub fn to_snippet(&self) -> String {
        format!(
            "Title: {}\nDescription: {}\nURL: {}",
            self.title, self.description, self.url
        )
    }
}

/// Anything that can turn a query into ranked hits.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns at most `limit` hits for `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Client for a SearxNG instance's JSON API (`/search?q=..&format=json`).
#[derive(Debug, Clone)]
pub struct SearxngProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl SearxngProvider {
    /// Builds a provider for `endpoint`, e.g. `http://localhost:8888/search`.
    ///
    /// # Errors
    /// Returns [`SearchError::Request`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        debug!(endpoint = %self.endpoint, query, "web search");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }
        let body: SearxngResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(body.into_hits(limit))
    }
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

impl SearxngResponse {
    fn into_hits(self, limit: usize) -> Vec<SearchHit> {
        self.results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(limit)
            .map(|r| SearchHit {
                title: r.title.trim().to_string(),
                description: r.content.trim().to_string(),
                url: r.url,
            })
            .collect()
    }
}
