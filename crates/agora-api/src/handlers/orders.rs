//! Order lookup handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use agora_session::RequireSession;
use agora_types::Order;

use crate::error::ApiResult;
use crate::state::AppState;

/// Fetch an order by id. Orders belong to wallet-backed sessions; guests get
/// their order payload once, in the poll response that settled it.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<Order>> {
    let auth = state.caller_auth(Some(&session))?;
    let order = state.orchestrator.get_order(&order_id, &auth).await?;
    Ok(Json(order))
}
