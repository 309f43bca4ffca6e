//! Business directory routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mylocal_shared::{
    Business, BusinessFilter, CreateBusinessRequest, PageQuery, Paginated, Role,
    UpdateBusinessRequest,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::{AuthUser, OptionalAuthUser};
use crate::state::AppState;

/// Public listing; only active businesses appear.
pub async fn list_businesses(
    State(state): State<AppState>,
    Query(filter): Query<BusinessFilter>,
) -> ApiResult<Json<Paginated<Business>>> {
    let (items, total) = state.store.list_businesses(&filter).await?;
    Ok(Json(Paginated::new(items, &filter.page_query(), total)))
}

pub async fn my_businesses(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Business>>> {
    user.require_role(&[Role::Vendor, Role::Admin])?;
    let (items, total) = state.store.list_owner_businesses(user.id(), &page).await?;
    Ok(Json(Paginated::new(items, &page, total)))
}

/// Inactive businesses are visible to their owner and admins only.
pub async fn get_business(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Business>> {
    let business = state.store.get_business(&id).await?;
    let privileged = viewer
        .as_ref()
        .is_some_and(|u| u.id == business.owner_id || u.role == Role::Admin);
    if !business.is_active && !privileged {
        return Err(ApiError::not_found("Business not found"));
    }
    Ok(Json(business))
}

pub async fn create_business(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBusinessRequest>,
) -> ApiResult<(StatusCode, Json<Business>)> {
    user.require_role(&[Role::Vendor, Role::Admin])?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Business name is required"));
    }
    tracing::info!("User {} creating business {}", user.id(), payload.name);
    let business = state.store.create_business(user.id(), payload).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

pub async fn update_business(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBusinessRequest>,
) -> ApiResult<Json<Business>> {
    let current = state.store.get_business(&id).await?;
    user.require_owner_or_admin(&current.owner_id)?;
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Business name cannot be empty"));
    }
    let business = state.store.update_business(&id, payload).await?;
    Ok(Json(business))
}

pub async fn delete_business(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let current = state.store.get_business(&id).await?;
    user.require_owner_or_admin(&current.owner_id)?;
    state.store.delete_business(&id).await?;
    tracing::info!("Business {} deleted by {}", id, user.id());
    Ok(StatusCode::NO_CONTENT)
}
