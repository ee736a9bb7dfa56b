//! Remote fetch collaborators.
//!
//! The cache fills itself through a [`ResourceFetcher`]. Two implementations:
//!
//! - [`HttpFetcher`] - the remote content API over HTTPS
//! - [`MemoryFetcher`] - in-memory records (tests, offline fixtures)

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use chub9p_types::{Character, Lorebook, ResourceKind, ResourceRecord, Session};

/// Fetch error type.
///
/// Network failure, non-2xx status, and malformed payloads are all just
/// "fetch failed" to the cache; the variants exist for logging.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("decode {kind} {id}: {source}")]
    Decode {
        kind: ResourceKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no such {kind}: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{0}")]
    Other(String),
}

/// Fetch result type.
pub type FetchResult<T> = Result<T, FetchError>;

/// Retrieves one resource by kind and id.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> FetchResult<ResourceRecord>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetcher for the remote content API.
///
/// Issues `GET {base}/api/core/{characters|lorebooks|chats}/{id}` with a
/// bearer token when an API key is configured.
pub struct HttpFetcher {
    client: reqwest::Client,
    base: reqwest::Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base", &self.base.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpFetcher {
    /// Create a fetcher against `base` (e.g. `https://api.chub.ai`).
    ///
    /// `timeout` bounds each request at the HTTP layer; the cache applies
    /// its own bound on top.
    pub fn new(base: &str, api_key: Option<String>, timeout: Duration) -> FetchResult<Self> {
        let base = reqwest::Url::parse(base)
            .map_err(|e| FetchError::Other(format!("invalid api base {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::Other(format!("invalid api base {base}")));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    /// URL for one resource. Ids are percent-encoded as a single segment.
    pub fn resource_url(&self, kind: ResourceKind, id: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "core", kind.api_segment(), id]);
        }
        url
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> FetchResult<ResourceRecord> {
        let url = self.resource_url(kind, id);
        tracing::debug!(%url, "fetching resource");

        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        ResourceRecord::from_json(kind, &body).map_err(|source| FetchError::Decode {
            kind,
            id: id.to_string(),
            source,
        })
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Fixture file layout for [`MemoryFetcher::from_fixtures`].
#[derive(Debug, Default, Deserialize)]
struct Fixtures {
    #[serde(default)]
    characters: Vec<Character>,
    #[serde(default)]
    lorebooks: Vec<Lorebook>,
    #[serde(default)]
    sessions: Vec<Session>,
}

/// In-memory fetcher.
///
/// Counts calls and can be switched into a failing mode, which makes it the
/// fetch double for cache and walk tests.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    records: RwLock<HashMap<(ResourceKind, String), ResourceRecord>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a fixture document:
    /// `{"characters": [...], "lorebooks": [...], "sessions": [...]}`.
    pub fn from_fixtures(json: &str) -> Result<Self, serde_json::Error> {
        let fixtures: Fixtures = serde_json::from_str(json)?;
        let fetcher = Self::new();
        for c in fixtures.characters {
            fetcher.insert(c);
        }
        for l in fixtures.lorebooks {
            fetcher.insert(l);
        }
        for s in fixtures.sessions {
            fetcher.insert(s);
        }
        Ok(fetcher)
    }

    /// Add or replace a record.
    pub fn insert(&self, record: impl Into<ResourceRecord>) {
        let record = record.into();
        let key = (record.kind(), record.id().to_string());
        self.records.write().insert(key, record);
    }

    /// Remove a record. Returns true if it existed.
    pub fn remove(&self, kind: ResourceKind, id: &str) -> bool {
        self.records.write().remove(&(kind, id.to_string())).is_some()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `fetch` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside every fetch.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> FetchResult<ResourceRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Other("fetch failed".to_string()));
        }

        self.records
            .read()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                kind,
                id: id.to_string(),
            })
    }
}
