//! Moderation panel routes. Every handler requires the admin role.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mylocal_shared::{
    AdminBusinessFilter, AdminPostFilter, AdminReviewFilter, AdminStats, AdminUpdateBusinessRequest,
    AdminUpdateUserRequest, AdminUserFilter, Business, PageQuery, Paginated, Post,
    PostStatusRequest, Review, ReviewStatusRequest, Role, User,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

fn require_admin(user: &AuthUser) -> ApiResult<()> {
    user.require_role(&[Role::Admin])
}

fn page_of(page: Option<u32>, limit: Option<u32>) -> PageQuery {
    PageQuery { page, limit }
}

pub async fn stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<AdminStats>> {
    require_admin(&user)?;
    Ok(Json(state.store.admin_stats().await?))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<AdminUserFilter>,
) -> ApiResult<Json<Paginated<User>>> {
    require_admin(&user)?;
    let (items, total) = state.store.list_users(&filter).await?;
    Ok(Json(Paginated::new(items, &page_of(filter.page, filter.limit), total)))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&user)?;
    if id == user.id() {
        if payload.role.is_some_and(|r| r != Role::Admin) {
            return Err(ApiError::bad_request("You cannot change your own role"));
        }
        if payload.is_active == Some(false) {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
    }
    let updated = state
        .store
        .admin_update_user(&id, payload.role, payload.is_active)
        .await?;
    tracing::info!("Admin {} updated user {}", user.id(), id);
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&user)?;
    if id == user.id() {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    state.store.delete_user(&id).await?;
    tracing::info!("Admin {} deleted user {}", user.id(), id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_businesses(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<AdminBusinessFilter>,
) -> ApiResult<Json<Paginated<Business>>> {
    require_admin(&user)?;
    let (items, total) = state.store.admin_list_businesses(&filter).await?;
    Ok(Json(Paginated::new(items, &page_of(filter.page, filter.limit), total)))
}

pub async fn update_business(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AdminUpdateBusinessRequest>,
) -> ApiResult<Json<Business>> {
    require_admin(&user)?;
    let business = state
        .store
        .admin_update_business(&id, payload.is_verified, payload.is_active)
        .await?;
    Ok(Json(business))
}

pub async fn delete_business(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&user)?;
    state.store.delete_business(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reviews(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<AdminReviewFilter>,
) -> ApiResult<Json<Paginated<Review>>> {
    require_admin(&user)?;
    let (items, total) = state.store.admin_list_reviews(&filter).await?;
    Ok(Json(Paginated::new(items, &page_of(filter.page, filter.limit), total)))
}

pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ReviewStatusRequest>,
) -> ApiResult<Json<Review>> {
    require_admin(&user)?;
    let review = state.store.set_review_status(&id, payload.status).await?;
    Ok(Json(review))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&user)?;
    state.store.delete_review(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_posts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<AdminPostFilter>,
) -> ApiResult<Json<Paginated<Post>>> {
    require_admin(&user)?;
    let (items, total) = state.store.admin_list_posts(&filter).await?;
    Ok(Json(Paginated::new(items, &page_of(filter.page, filter.limit), total)))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<PostStatusRequest>,
) -> ApiResult<Json<Post>> {
    require_admin(&user)?;
    let post = state.store.set_post_status(&id, payload.status).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&user)?;
    state.store.delete_post(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
