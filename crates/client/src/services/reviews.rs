use mylocal_shared::{ApiError, CreateReviewRequest, PageQuery, Paginated, Review, UpdateReviewRequest};

use super::seg;
use crate::api_client::ApiClient;

/// Approved reviews of a business, newest first.
pub async fn list_for_business(
    api: &ApiClient,
    business_id: &str,
    page: &PageQuery,
) -> Result<Paginated<Review>, ApiError> {
    api.get_query(&format!("/api/businesses/{}/reviews", seg(business_id)), page)
        .await
}

pub async fn create(
    api: &ApiClient,
    business_id: &str,
    req: &CreateReviewRequest,
) -> Result<Review, ApiError> {
    api.post_json(&format!("/api/businesses/{}/reviews", seg(business_id)), req)
        .await
}

pub async fn update(api: &ApiClient, id: &str, req: &UpdateReviewRequest) -> Result<Review, ApiError> {
    api.put_json(&format!("/api/reviews/{}", seg(id)), req).await
}

pub async fn delete(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/reviews/{}", seg(id))).await
}

pub async fn report(api: &ApiClient, id: &str) -> Result<Review, ApiError> {
    api.post_empty(&format!("/api/reviews/{}/report", seg(id))).await
}
