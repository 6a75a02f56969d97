//! Catalog passthrough handlers.
//!
//! The store serves its catalog to anyone, so these never attach credentials
//! regardless of how the caller authenticated.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use agora_types::Product;

use crate::dto::{ProductsQuery, ProductsResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn browse_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductsQuery>,
) -> ApiResult<Json<ProductsResponse>> {
    let products = state
        .store
        .browse_products(
            query.q.as_deref(),
            query.category.as_deref(),
            query.limit,
            None,
        )
        .await?;
    Ok(Json(ProductsResponse { products }))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> ApiResult<Json<Product>> {
    let product = state.store.get_product(&product_id, None).await?;
    Ok(Json(product))
}
