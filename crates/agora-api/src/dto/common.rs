//! Common DTO types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Liveness response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the process can answer at all
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Time of the response
    pub timestamp: DateTime<Utc>,
}
