//! Pending authorization records and the store abstraction behind them.
//!
//! The gateway owns these records exclusively; they never outlive the
//! process. The trait exists so a distributed cache could replace the
//! in-process map without touching orchestration logic.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

/// Common surface of records kept while an out-of-band approval is underway.
pub trait PendingRecord: Clone + Send + Sync + 'static {
    fn checkout_session_id(&self) -> &str;
    fn expires_at(&self) -> DateTime<Utc>;
}

/// A guest device authorization in flight.
#[derive(Clone)]
pub struct PendingDeviceAuthorization {
    pub request_id: String,
    pub checkout_session_id: String,
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub authorization_url: String,
    pub expires_at: DateTime<Utc>,
    pub poll_interval: u64,
    pub amount: Decimal,
    pub currency: String,
    pub qr_png: Option<Vec<u8>>,
}

// Secret material must never reach log output.
impl fmt::Debug for PendingDeviceAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDeviceAuthorization")
            .field("request_id", &self.request_id)
            .field("checkout_session_id", &self.checkout_session_id)
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("expires_at", &self.expires_at)
            .field("poll_interval", &self.poll_interval)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("qr_png", &self.qr_png.as_ref().map(Vec::len))
            .finish()
    }
}

impl PendingRecord for PendingDeviceAuthorization {
    fn checkout_session_id(&self) -> &str {
        &self.checkout_session_id
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// A step-up approval in flight for an authenticated caller.
#[derive(Debug, Clone)]
pub struct PendingStepUp {
    pub step_up_id: String,
    pub checkout_session_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingRecord for PendingStepUp {
    fn checkout_session_id(&self) -> &str {
        &self.checkout_session_id
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Keyed storage for pending records.
#[async_trait]
pub trait PendingStore<T: PendingRecord>: Send + Sync {
    async fn get(&self, id: &str) -> Option<T>;

    async fn insert(&self, id: String, record: T);

    /// Remove and return in one step, so two concurrent polls of the same
    /// record cannot both observe it as live.
    async fn take(&self, id: &str) -> Option<T>;

    /// Drop every record tied to the given checkout session.
    async fn remove_for_checkout(&self, checkout_session_id: &str) -> usize;

    /// Drop records past their deadline, returning how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local implementation on a concurrent map.
pub struct InMemoryPendingStore<T> {
    records: DashMap<String, T>,
}

impl<T> InMemoryPendingStore<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> Default for InMemoryPendingStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: PendingRecord> PendingStore<T> for InMemoryPendingStore<T> {
    async fn get(&self, id: &str) -> Option<T> {
        self.records.get(id).map(|entry| entry.clone())
    }

    async fn insert(&self, id: String, record: T) {
        self.records.insert(id, record);
    }

    async fn take(&self, id: &str) -> Option<T> {
        self.records.remove(id).map(|(_, record)| record)
    }

    async fn remove_for_checkout(&self, checkout_session_id: &str) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            if record.checkout_session_id() == checkout_session_id {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            if now >= record.expires_at() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}
