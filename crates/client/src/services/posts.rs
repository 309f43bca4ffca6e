use mylocal_shared::{
    ApiError, CommentRequest, CreatePostRequest, LikeResponse, Paginated, Post, PostFilter,
    UpdatePostRequest,
};

use super::seg;
use crate::api_client::ApiClient;

pub async fn list(api: &ApiClient, filter: &PostFilter) -> Result<Paginated<Post>, ApiError> {
    api.get_query("/api/posts", filter).await
}

pub async fn get(api: &ApiClient, id: &str) -> Result<Post, ApiError> {
    api.get_json(&format!("/api/posts/{}", seg(id))).await
}

pub async fn create(api: &ApiClient, req: &CreatePostRequest) -> Result<Post, ApiError> {
    api.post_json("/api/posts", req).await
}

/// Only the fields set on `req` are sent, and only those change.
pub async fn update(api: &ApiClient, id: &str, req: &UpdatePostRequest) -> Result<Post, ApiError> {
    api.put_json(&format!("/api/posts/{}", seg(id)), req).await
}

pub async fn delete(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/posts/{}", seg(id))).await
}

pub async fn toggle_like(api: &ApiClient, id: &str) -> Result<LikeResponse, ApiError> {
    api.post_empty(&format!("/api/posts/{}/like", seg(id))).await
}

/// Returns the post with the new comment appended.
pub async fn add_comment(api: &ApiClient, post_id: &str, content: &str) -> Result<Post, ApiError> {
    let req = CommentRequest {
        content: content.to_string(),
    };
    api.post_json(&format!("/api/posts/{}/comments", seg(post_id)), &req)
        .await
}

pub async fn edit_comment(
    api: &ApiClient,
    post_id: &str,
    comment_id: &str,
    content: &str,
) -> Result<Post, ApiError> {
    let req = CommentRequest {
        content: content.to_string(),
    };
    api.put_json(
        &format!("/api/posts/{}/comments/{}", seg(post_id), seg(comment_id)),
        &req,
    )
    .await
}

pub async fn delete_comment(api: &ApiClient, post_id: &str, comment_id: &str) -> Result<Post, ApiError> {
    let path = format!("/api/posts/{}/comments/{}", seg(post_id), seg(comment_id));
    api.delete_json(&path).await
}

pub async fn toggle_comment_like(
    api: &ApiClient,
    post_id: &str,
    comment_id: &str,
) -> Result<LikeResponse, ApiError> {
    api.post_empty(&format!(
        "/api/posts/{}/comments/{}/like",
        seg(post_id),
        seg(comment_id)
    ))
    .await
}
