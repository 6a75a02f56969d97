//! Advisory spending-limit evaluation.
//!
//! The wallet's answer to a payment-token request is authoritative; this
//! evaluation only predicts it, so the orchestrator can log and shape
//! messages before the round trip.

use std::fmt;

use agora_types::SpendingLimits;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    /// The amount fits every known limit.
    AutoApprove,
    /// The wallet is expected to demand human approval.
    StepUpExpected { exceeded: ExceededLimit },
    /// Amounts in different currencies are never compared.
    CurrencyMismatch { limit_currency: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceededLimit {
    PerTransaction,
    DailyRemaining,
    MonthlyRemaining,
}

impl fmt::Display for ExceededLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceededLimit::PerTransaction => "per_transaction",
            ExceededLimit::DailyRemaining => "daily_remaining",
            ExceededLimit::MonthlyRemaining => "monthly_remaining",
        };
        f.write_str(name)
    }
}

pub fn evaluate(amount: Decimal, currency: &str, limits: &SpendingLimits) -> LimitDecision {
    if !currency.eq_ignore_ascii_case(&limits.currency) {
        return LimitDecision::CurrencyMismatch {
            limit_currency: limits.currency.clone(),
        };
    }
    if amount > limits.per_transaction {
        return LimitDecision::StepUpExpected {
            exceeded: ExceededLimit::PerTransaction,
        };
    }
    if amount > limits.daily_remaining {
        return LimitDecision::StepUpExpected {
            exceeded: ExceededLimit::DailyRemaining,
        };
    }
    if let Some(monthly_remaining) = limits.monthly_remaining {
        if amount > monthly_remaining {
            return LimitDecision::StepUpExpected {
                exceeded: ExceededLimit::MonthlyRemaining,
            };
        }
    }
    LimitDecision::AutoApprove
}
