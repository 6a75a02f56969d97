use agora_store::StoreError;
use agora_types::CheckoutStatus;
use agora_wallet::WalletError;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Completion was attempted while the checkout was not ready for it.
    #[error("checkout is not ready for payment (current status: {status})")]
    InvalidState {
        status: CheckoutStatus,
        next_step: &'static str,
    },

    #[error("checkout session not found")]
    UnknownCheckout,

    #[error("payment authorization request not found")]
    UnknownAuthorization,

    #[error("step-up request not found")]
    UnknownStepUp,

    /// The pending record exists but belongs to a different checkout.
    #[error("request does not match this checkout session")]
    AuthorizationMismatch,

    #[error("authorization request has expired")]
    Expired,

    #[error("a session is required for this operation")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl CheckoutError {
    /// Upstream HTTP status, when the failure came from the store or wallet.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            CheckoutError::Store(err) => err.status(),
            CheckoutError::Wallet(err) => err.status(),
            _ => None,
        }
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;
