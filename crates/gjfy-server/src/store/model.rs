use std::ops::Deref;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Placeholder shown instead of the secret in metadata-only views.
pub const HIDDEN_SECRET: &str = "#HIDDEN#";

/// Route prefix of the JSON retrieval endpoint; the id is appended.
pub const PATH_API_GET: &str = "/api/v1/get/";
/// Route of the HTML view page; the id goes in the `id` query parameter.
pub const PATH_VIEW: &str = "/g";

/// A stored secret together with its usage quota and validity window.
///
/// The payload is wiped from memory when the record is dropped, which
/// includes the copy removed from the store on burn or expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    pub secret: String,
    /// Number of retrievals allowed before the record self-destructs.
    pub max_clicks: u32,
    /// Number of retrievals so far.
    pub clicks: u32,
    #[zeroize(skip)]
    pub date_added: DateTime<Utc>,
    /// Validity window in days, counted from `date_added`.
    pub valid_for: u32,
}

impl SecretRecord {
    /// The instant from which the record is no longer retrievable.
    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.date_added
            .checked_add_signed(Duration::days(i64::from(self.valid_for)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True once the validity window has closed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// True once every allowed click has been used.
    pub fn is_exhausted(&self) -> bool {
        self.clicks >= self.max_clicks
    }

    pub fn remaining_clicks(&self) -> u32 {
        self.max_clicks.saturating_sub(self.clicks)
    }
}

/// Builds the externally addressable links for an id.
///
/// Ids are inserted as they are. Derived ids are URL-safe base64; explicit
/// ids passed to `SecretStore::create` must be URL-safe as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    /// `base_url` is scheme, host and port, e.g. `http://localhost:9154`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path_query(&self, id: &str) -> String {
        format!("{PATH_VIEW}?id={id}")
    }

    pub fn url(&self, id: &str) -> String {
        format!("{}{}", self.base_url, self.path_query(id))
    }

    pub fn api_url(&self, id: &str) -> String {
        format!("{}{PATH_API_GET}{id}", self.base_url)
    }
}

/// Full-disclosure view of a record: the secret plus its id and links.
/// Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntryInfo {
    #[serde(flatten)]
    pub entry: SecretRecord,
    pub id: String,
    pub path_query: String,
    pub url: String,
    pub api_url: String,
}

impl StoreEntryInfo {
    pub fn new(id: &str, entry: SecretRecord, endpoints: &Endpoints) -> Self {
        Self {
            entry,
            id: id.to_owned(),
            path_query: endpoints.path_query(id),
            url: endpoints.url(id),
            api_url: endpoints.api_url(id),
        }
    }

    /// Drop the secret and keep everything else.
    pub fn hidden(mut self) -> HiddenEntryInfo {
        self.entry.secret.zeroize();
        self.entry.secret.push_str(HIDDEN_SECRET);
        HiddenEntryInfo(self)
    }
}

/// Metadata-only view of a record. Serializes exactly like
/// [`StoreEntryInfo`] but the `secret` field always reads [`HIDDEN_SECRET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HiddenEntryInfo(StoreEntryInfo);

impl Deref for HiddenEntryInfo {
    type Target = StoreEntryInfo;

    fn deref(&self) -> &StoreEntryInfo {
        &self.0
    }
}
