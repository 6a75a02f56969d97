//! Registration and session DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_types::SpendingLimits;

// =============================================================================
// Registration
// =============================================================================

/// Pairing-code registration request
///
/// Fields are optional so missing and empty values can share one validation
/// path in the handler.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Pairing code shown in the user's wallet app
    #[serde(default)]
    pub pairing_code: Option<String>,
    /// Name the agent introduces itself with
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Free-form description shown on the approval screen
    #[serde(default)]
    pub agent_description: Option<String>,
}

/// Acknowledgement for a submitted registration
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSubmitted {
    /// Always `pending`
    pub status: &'static str,
    /// Wallet-issued access request id
    pub request_id: String,
    pub message: &'static str,
    /// Where to poll for the approval decision
    pub poll_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Where a registration currently stands
///
/// `session_id` through `spending_limits` are present only on approval;
/// `time_remaining_seconds` only while pending.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_limits: Option<SpendingLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_seconds: Option<u64>,
    pub message: &'static str,
}

// =============================================================================
// Session
// =============================================================================

/// Current session echo
#[derive(Debug, Clone, Serialize)]
pub struct SessionEcho {
    pub session_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
}
