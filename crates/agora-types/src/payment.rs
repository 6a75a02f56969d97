use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spending limits attached to an agent's wallet credential.
///
/// This is a read-only snapshot taken from the wallet service right before a
/// payment request. It is never cached across requests; the remaining
/// balances move underneath us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingLimits {
    pub per_transaction: Decimal,
    pub daily: Decimal,
    pub daily_remaining: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_remaining: Option<Decimal>,
    pub currency: String,
}

/// Lifecycle of a step-up approval held by the wallet service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUpState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl StepUpState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepUpState::Pending)
    }
}

/// Status of a step-up approval as reported by the wallet service.
///
/// `payment_token` is populated only once the request is approved, and is
/// meant to be consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpStatus {
    pub status: StepUpState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StepUpStatus {
    /// Synthetic terminal status used when a bounded wait runs out of time.
    pub fn expired() -> Self {
        Self {
            status: StepUpState::Expired,
            payment_token: None,
            expires_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn limits_serialize_amounts_as_numbers() {
        let limits = SpendingLimits {
            per_transaction: dec!(100),
            daily: dec!(500),
            daily_remaining: dec!(463.10),
            monthly: Some(dec!(1000)),
            monthly_remaining: None,
            currency: "CAD".into(),
        };

        let value = serde_json::to_value(&limits).unwrap();
        assert!(value["per_transaction"].is_number());
        assert!(value["daily_remaining"].is_number());
        assert!(value.get("monthly_remaining").is_none());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!StepUpState::Pending.is_terminal());
        assert!(StepUpState::Approved.is_terminal());
        assert!(StepUpState::Rejected.is_terminal());
        assert!(StepUpState::Expired.is_terminal());
    }

    #[test]
    fn step_up_status_parses_wallet_payload() {
        let status: StepUpStatus = serde_json::from_value(serde_json::json!({
            "status": "approved",
            "payment_token": "ptok_abc"
        }))
        .unwrap();
        assert_eq!(status.status, StepUpState::Approved);
        assert_eq!(status.payment_token.as_deref(), Some("ptok_abc"));
    }
}
