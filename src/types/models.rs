use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named structured document. Soft-deleted rows keep their name reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub data: Value,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when inserting an asset. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub name: String,
    pub data: Value,
}

impl NewAsset {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct AssetChanges {
    pub name: Option<String>,
    pub data: Option<Value>,
}

impl AssetChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.data.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    pub identifier: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessToken {
    /// Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub identifier: String,
    pub token_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
}
