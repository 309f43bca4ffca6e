//! Chat routes. Live updates go through the relay in [`crate::ws`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mylocal_shared::{
    Chat, ChatMessage, CreateChatRequest, PageQuery, Paginated, SendMessageRequest, UnreadCount,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::store::chats::NewMessage;
use crate::ws::{check_new_message, deliver_message};

async fn participant_chat(state: &AppState, user: &AuthUser, chat_id: &str) -> ApiResult<Chat> {
    let chat = state.store.get_chat(chat_id).await?;
    if !chat.has_participant(user.id()) {
        return Err(ApiError::forbidden("You are not a participant in this chat"));
    }
    Ok(chat)
}

pub async fn list_chats(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Chat>>> {
    let (items, total) = state.store.list_user_chats(user.id(), &page).await?;
    Ok(Json(Paginated::new(items, &page, total)))
}

/// The requester is always a participant. An existing chat with the same
/// participants and business is returned with 200 instead of 201.
pub async fn create_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateChatRequest>,
) -> ApiResult<(StatusCode, Json<Chat>)> {
    let mut participants = vec![user.id().to_string()];
    for id in payload.participant_ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !participants.contains(&id) {
            participants.push(id);
        }
    }
    if participants.len() < 2 {
        return Err(ApiError::bad_request("A chat needs at least one other participant"));
    }

    let business_id = payload.business_id.as_deref().filter(|b| !b.is_empty());
    let (chat, created) = state.store.create_or_get_chat(&participants, business_id).await?;
    if created {
        tracing::info!("Chat {} created by {}", chat.id, user.id());
        state.hub.notify_participants(&chat).await;
        Ok((StatusCode::CREATED, Json(chat)))
    } else {
        Ok((StatusCode::OK, Json(chat)))
    }
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<UnreadCount>> {
    let count = state.store.unread_count(user.id()).await?;
    Ok(Json(UnreadCount { count }))
}

pub async fn get_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Chat>> {
    Ok(Json(participant_chat(&state, &user, &id).await?))
}

/// Chronological history; `page=1` is the most recent page.
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paginated<ChatMessage>>> {
    participant_chat(&state, &user, &id).await?;
    let (items, total) = state.store.list_messages(&id, &page).await?;
    Ok(Json(Paginated::new(items, &page, total)))
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let chat = participant_chat(&state, &user, &id).await?;
    let message_type = payload.message_type.unwrap_or_default();
    check_new_message(&payload.content, message_type, payload.attachment_url.as_deref())
        .map_err(ApiError::bad_request)?;

    let new = NewMessage {
        message_type,
        content: payload.content.trim().to_string(),
        attachment_url: payload.attachment_url,
    };
    let message = deliver_message(&state, &chat, user.id(), new).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
