use crate::error::{FlagAtlasError, Result};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

pub const WIKIDATA_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const USER_AGENT: &str = concat!(
    "FlagAtlas/",
    env!("CARGO_PKG_VERSION"),
    " (flag catalogue; https://github.com/justenoughflags/flagatlas)"
);

/// Anything that can answer a SPARQL SELECT with result bindings.
pub trait SparqlSource {
    fn select(&self, query: &str) -> Result<Vec<Binding>>;
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SparqlValue {
    value: String,
}

/// One result row: variable name to value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Binding(HashMap<String, SparqlValue>);

impl Binding {
    /// The bound value, or "" when the variable is unbound.
    pub fn value(&self, key: &str) -> &str {
        self.0.get(key).map(|v| v.value.as_str()).unwrap_or("")
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Binding(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    (
                        k.to_string(),
                        SparqlValue {
                            value: v.to_string(),
                        },
                    )
                })
                .collect(),
        )
    }
}

/// Parse a `application/sparql-results+json` document.
pub fn parse_results(body: &str) -> Result<Vec<Binding>> {
    let response: SparqlResponse = serde_json::from_str(body)?;
    Ok(response.results.bindings)
}

#[derive(Debug, Clone)]
pub struct SparqlConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Total tries per query. 1 means no retry.
    pub max_attempts: u32,
}

impl Default for SparqlConfig {
    fn default() -> Self {
        SparqlConfig {
            endpoint: WIKIDATA_ENDPOINT.to_string(),
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(120),
            max_attempts: 1,
        }
    }
}

/// Blocking HTTP client for a SPARQL endpoint.
pub struct SparqlClient {
    http: reqwest::blocking::Client,
    config: SparqlConfig,
}

impl SparqlClient {
    pub fn new(config: SparqlConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(SparqlClient { http, config })
    }

    fn fetch(&self, query: &str) -> Result<Vec<Binding>> {
        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&[("query", query), ("format", "json")])
            .header(ACCEPT, "application/sparql-results+json")
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        parse_results(&body)
    }
}

impl SparqlSource for SparqlClient {
    fn select(&self, query: &str) -> Result<Vec<Binding>> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch(query) {
                Ok(bindings) => return Ok(bindings),
                Err(e) if attempt < max_attempts => {
                    let wait = backoff(http_status(&e), attempt);
                    log::warn!(
                        "SPARQL attempt {attempt}/{max_attempts} failed ({e}), retrying in {}s",
                        wait.as_secs()
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn http_status(err: &FlagAtlasError) -> Option<u16> {
    match err {
        FlagAtlasError::Http(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    }
}

/// Wait before the next attempt: rate limiting backs off hardest,
/// gateway timeouts grow linearly, anything else waits 5s.
pub fn backoff(status: Option<u16>, attempt: u32) -> Duration {
    match status {
        Some(429) => Duration::from_secs(15 * u64::from(attempt)),
        Some(504) => Duration::from_secs(5 * u64::from(attempt)),
        _ => Duration::from_secs(5),
    }
}
