//! Web search providers
//!
//! Web results supplement the document corpus for queries that need fresh
//! information. Providers are optional collaborators: the pipeline treats any
//! failure here as "no web results" and carries on.
//!
//! - [`DuckDuckGoSearch`]: DuckDuckGo Instant Answer API, no key needed
//! - [`TavilySearch`]: Tavily search API, key required
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::web::{build_web_search, WebSearch};
//!
//! let web = build_web_search(&settings.web_search)?;
//! let results = web.search("latest Rust release", 5).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{WebProvider, WebSearchSettings};
use crate::{Error, Result};

const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// One web search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider that produced the hit
    pub source: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// At most `max_results` hits for the query.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;

    fn name(&self) -> &str;
}

/// Build the provider selected in settings.
pub fn build_web_search(settings: &WebSearchSettings) -> Result<Box<dyn WebSearch>> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    Ok(match settings.provider {
        WebProvider::DuckDuckGo => Box::new(DuckDuckGoSearch::new(timeout)?),
        WebProvider::Tavily => {
            let key = settings.tavily_api_key.clone().ok_or_else(|| {
                Error::Configuration("tavily provider requires an API key".to_string())
            })?;
            Box::new(TavilySearch::new(key, timeout)?)
        }
    })
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ragpipe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Transport failures mean the provider is unreachable; anything the
/// provider answered with is a web search error.
fn request_error(provider: &'static str, err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::unavailable(provider, err.to_string())
    } else {
        Error::WebSearch(format!("{provider}: {err}"))
    }
}

fn status_error(provider: &str, status: StatusCode, body: &str) -> Error {
    Error::WebSearch(format!("{provider} returned {status}: {body}"))
}

/// DuckDuckGo Instant Answer API.
///
/// Returns the abstract (when there is one) followed by related topics.
/// Coverage is limited to topics DuckDuckGo has an instant answer for.
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    #[instrument(skip(self), fields(provider = "duckduckgo"))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|e| Error::Configuration(format!("invalid DuckDuckGo endpoint: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("duckduckgo", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("duckduckgo", status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::WebSearch(format!("duckduckgo: invalid response: {e}")))?;

        let results = parse_instant_answer(&body, max_results);
        debug!(results = results.len(), "web search complete");
        Ok(results)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// Map an Instant Answer response to results.
fn parse_instant_answer(body: &Value, max_results: usize) -> Vec<WebResult> {
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let mut results = Vec::new();

    let abstract_text = text(body, "AbstractText");
    if !abstract_text.is_empty() {
        results.push(WebResult {
            title: text(body, "Heading"),
            url: text(body, "AbstractURL"),
            snippet: abstract_text,
            source: "duckduckgo".to_string(),
        });
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = body.get("RelatedTopics").and_then(Value::as_array) {
        for topic in related {
            // grouped topics nest one level deep
            match topic.get("Topics").and_then(Value::as_array) {
                Some(group) => topics.extend(group),
                None => topics.push(topic),
            }
        }
    }

    for topic in topics {
        let snippet = text(topic, "Text");
        let url = text(topic, "FirstURL");
        if snippet.is_empty() || url.is_empty() {
            continue;
        }
        let title = snippet
            .split_once(" - ")
            .map_or(snippet.as_str(), |(title, _)| title)
            .to_string();
        results.push(WebResult {
            title,
            url,
            snippet,
            source: "duckduckgo".to_string(),
        });
    }

    results.truncate(max_results);
    results
}

/// Tavily search API.
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("missing Tavily API key".to_string()));
        }
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            endpoint: TAVILY_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    #[instrument(skip(self), fields(provider = "tavily"))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest { query, max_results })
            .send()
            .await
            .map_err(|e| request_error("tavily", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("tavily", status, &body));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| Error::WebSearch(format!("tavily: invalid response: {e}")))?;

        let results: Vec<WebResult> = parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|hit| WebResult {
                title: hit.title,
                url: hit.url,
                snippet: hit.content,
                source: "tavily".to_string(),
            })
            .collect();

        debug!(results = results.len(), "web search complete");
        Ok(results)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
