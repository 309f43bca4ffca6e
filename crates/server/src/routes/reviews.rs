//! Review routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mylocal_shared::{CreateReviewRequest, PageQuery, Paginated, Review, UpdateReviewRequest};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

fn check_rating(rating: u8) -> ApiResult<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Rating must be between 1 and 5"))
    }
}

pub async fn list_business_reviews(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Review>>> {
    let (items, total) = state.store.list_business_reviews(&business_id, &page).await?;
    Ok(Json(Paginated::new(items, &page, total)))
}

pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(business_id): Path<String>,
    Json(payload): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    check_rating(payload.rating)?;
    if payload.comment.trim().is_empty() {
        return Err(ApiError::bad_request("Review comment is required"));
    }
    let business = state.store.get_business(&business_id).await?;
    if business.owner_id == user.id() {
        return Err(ApiError::forbidden("You cannot review your own business"));
    }
    let review = state
        .store
        .create_review(&business_id, user.id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Only the author may edit a review.
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateReviewRequest>,
) -> ApiResult<Json<Review>> {
    let current = state.store.get_review(&id).await?;
    if current.user_id != user.id() {
        return Err(ApiError::forbidden("You can only edit your own reviews"));
    }
    if let Some(rating) = payload.rating {
        check_rating(rating)?;
    }
    if payload.comment.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ApiError::bad_request("Review comment cannot be empty"));
    }
    let review = state.store.update_review(&id, &payload).await?;
    Ok(Json(review))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let current = state.store.get_review(&id).await?;
    user.require_owner_or_admin(&current.user_id)?;
    state.store.delete_review(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Review>> {
    let current = state.store.get_review(&id).await?;
    if current.user_id == user.id() {
        return Err(ApiError::bad_request("You cannot report your own review"));
    }
    let review = state.store.report_review(&id, user.id()).await?;
    tracing::info!("Review {} reported ({} reports)", id, review.report_count);
    Ok(Json(review))
}
