//! Moderation endpoints; every call requires an admin session.

use mylocal_shared::{
    AdminBusinessFilter, AdminPostFilter, AdminReviewFilter, AdminStats, AdminUpdateBusinessRequest,
    AdminUpdateUserRequest, AdminUserFilter, ApiError, Business, Paginated, Post, PostStatus,
    PostStatusRequest, Review, ReviewStatus, ReviewStatusRequest, User,
};

use super::seg;
use crate::api_client::ApiClient;

pub async fn stats(api: &ApiClient) -> Result<AdminStats, ApiError> {
    api.get_json("/api/admin/stats").await
}

// --- Users ---

pub async fn list_users(api: &ApiClient, filter: &AdminUserFilter) -> Result<Paginated<User>, ApiError> {
    api.get_query("/api/admin/users", filter).await
}

pub async fn update_user(
    api: &ApiClient,
    id: &str,
    req: &AdminUpdateUserRequest,
) -> Result<User, ApiError> {
    api.patch_json(&format!("/api/admin/users/{}", seg(id)), req).await
}

pub async fn delete_user(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/admin/users/{}", seg(id))).await
}

// --- Businesses ---

pub async fn list_businesses(
    api: &ApiClient,
    filter: &AdminBusinessFilter,
) -> Result<Paginated<Business>, ApiError> {
    api.get_query("/api/admin/businesses", filter).await
}

pub async fn update_business(
    api: &ApiClient,
    id: &str,
    req: &AdminUpdateBusinessRequest,
) -> Result<Business, ApiError> {
    api.patch_json(&format!("/api/admin/businesses/{}", seg(id)), req)
        .await
}

pub async fn delete_business(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/admin/businesses/{}", seg(id))).await
}

// --- Reviews ---

pub async fn list_reviews(
    api: &ApiClient,
    filter: &AdminReviewFilter,
) -> Result<Paginated<Review>, ApiError> {
    api.get_query("/api/admin/reviews", filter).await
}

pub async fn set_review_status(api: &ApiClient, id: &str, status: ReviewStatus) -> Result<Review, ApiError> {
    api.patch_json(
        &format!("/api/admin/reviews/{}", seg(id)),
        &ReviewStatusRequest { status },
    )
    .await
}

pub async fn delete_review(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/admin/reviews/{}", seg(id))).await
}

// --- Posts ---

pub async fn list_posts(api: &ApiClient, filter: &AdminPostFilter) -> Result<Paginated<Post>, ApiError> {
    api.get_query("/api/admin/posts", filter).await
}

pub async fn set_post_status(api: &ApiClient, id: &str, status: PostStatus) -> Result<Post, ApiError> {
    api.patch_json(
        &format!("/api/admin/posts/{}", seg(id)),
        &PostStatusRequest { status },
    )
    .await
}

pub async fn delete_post(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/admin/posts/{}", seg(id))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::test_support::harness;
    use mylocal_shared::{ProblemDetails, Role};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn non_admin_gets_permission_notice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/stats"))
            .respond_with(ResponseTemplate::new(403).set_body_json(ProblemDetails::forbidden("Admin access required")))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let err = stats(&h.api).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(h.api.notifications().list().len(), 1);
    }

    #[tokio::test]
    async fn status_toggles_use_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/admin/posts/p1"))
            .and(body_json(json!({"status": "hidden"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p1", "authorId": "u1", "title": "t", "content": "c",
                "category": "general", "status": "hidden",
                "createdAt": "2024-05-01T10:00:00Z", "updatedAt": "2024-05-01T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let post = set_post_status(&h.api, "p1", PostStatus::Hidden).await.unwrap();
        assert_eq!(post.status, PostStatus::Hidden);
    }

    #[tokio::test]
    async fn user_filters_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/users"))
            .and(query_param("role", "vendor"))
            .and(query_param("isActive", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "pagination": {"page": 1, "limit": 10, "total": 0, "totalPages": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let filter = AdminUserFilter {
            role: Some(Role::Vendor),
            is_active: Some(false),
            ..Default::default()
        };
        let page = list_users(&h.api, &filter).await.unwrap();
        assert!(page.items.is_empty());
    }
}
