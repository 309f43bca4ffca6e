//! Community feed routes: posts, likes and comments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mylocal_shared::{
    CommentRequest, CreatePostRequest, LikeResponse, Paginated, Post, PostFilter, PostStatus,
    Role, UpdatePostRequest, User,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::{AuthUser, OptionalAuthUser};
use crate::state::AppState;

fn require_text(value: &str, what: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{what} is required")));
    }
    Ok(())
}

/// Load a post, answering 404 for hidden posts unless the viewer is the
/// author or an admin.
async fn visible_post(state: &AppState, id: &str, viewer: Option<&User>) -> ApiResult<Post> {
    let post = state.store.get_post(id).await?;
    if post.status == PostStatus::Hidden {
        let privileged = viewer.is_some_and(|u| u.id == post.author_id || u.role == Role::Admin);
        if !privileged {
            return Err(ApiError::not_found("Post not found"));
        }
    }
    Ok(post)
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> ApiResult<Json<Paginated<Post>>> {
    let (items, total) = state.store.list_posts(&filter).await?;
    Ok(Json(Paginated::new(items, &filter.page_query(), total)))
}

pub async fn get_post(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Post>> {
    let post = visible_post(&state, &id, viewer.as_ref()).await?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    require_text(&payload.title, "Title")?;
    require_text(&payload.content, "Content")?;
    let post = state.store.create_post(user.id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Author only; fields absent from the body are left untouched.
pub async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    let current = state.store.get_post(&id).await?;
    if current.author_id != user.id() {
        return Err(ApiError::forbidden("You can only edit your own posts"));
    }
    if let Some(title) = &payload.title {
        require_text(title, "Title")?;
    }
    if let Some(content) = &payload.content {
        require_text(content, "Content")?;
    }
    let post = state.store.update_post(&id, payload).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let current = state.store.get_post(&id).await?;
    user.require_owner_or_admin(&current.author_id)?;
    state.store.delete_post(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeResponse>> {
    visible_post(&state, &id, Some(&user.0)).await?;
    let (post, liked) = state.store.toggle_post_like(&id, user.id()).await?;
    Ok(Json(LikeResponse {
        liked,
        likes: post.likes.len() as u32,
    }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    require_text(&payload.content, "Comment")?;
    visible_post(&state, &id, Some(&user.0)).await?;
    let (post, _) = state.store.add_comment(&id, user.id(), &payload.content).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<Json<Post>> {
    require_text(&payload.content, "Comment")?;
    let post = visible_post(&state, &id, Some(&user.0)).await?;
    let comment = post
        .comments
        .iter()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.user_id != user.id() {
        return Err(ApiError::forbidden("You can only edit your own comments"));
    }
    let (post, _) = state
        .store
        .edit_comment(&id, &comment_id, &payload.content)
        .await?;
    Ok(Json(post))
}

/// Allowed to the comment author, the post author and admins.
pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> ApiResult<Json<Post>> {
    let post = visible_post(&state, &id, Some(&user.0)).await?;
    let comment = post
        .comments
        .iter()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.user_id != user.id() {
        user.require_owner_or_admin(&post.author_id)?;
    }
    let post = state.store.delete_comment(&id, &comment_id).await?;
    Ok(Json(post))
}

pub async fn toggle_comment_like(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> ApiResult<Json<LikeResponse>> {
    visible_post(&state, &id, Some(&user.0)).await?;
    let (post, liked) = state
        .store
        .toggle_comment_like(&id, &comment_id, user.id())
        .await?;
    let likes = post
        .comments
        .iter()
        .find(|c| c.id == comment_id)
        .map(|c| c.likes.len() as u32)
        .unwrap_or_default();
    Ok(Json(LikeResponse { liked, likes }))
}
