use mylocal_shared::{
    ApiError, Chat, ChatMessage, CreateChatRequest, PageQuery, Paginated, SendMessageRequest,
    UnreadCount,
};

use super::seg;
use crate::api_client::ApiClient;

/// My chats, most recently updated first.
pub async fn list(api: &ApiClient, page: &PageQuery) -> Result<Paginated<Chat>, ApiError> {
    api.get_query("/api/chats", page).await
}

/// Open a chat with `participant_ids`; an existing chat with the same
/// participants and business is returned instead of a new one.
pub async fn create_or_get(
    api: &ApiClient,
    participant_ids: Vec<String>,
    business_id: Option<String>,
) -> Result<Chat, ApiError> {
    let req = CreateChatRequest {
        participant_ids,
        business_id,
    };
    api.post_json("/api/chats", &req).await
}

pub async fn get(api: &ApiClient, id: &str) -> Result<Chat, ApiError> {
    api.get_json(&format!("/api/chats/{}", seg(id))).await
}

/// A page of messages in chronological order; page 1 is the latest.
pub async fn messages(
    api: &ApiClient,
    chat_id: &str,
    page: &PageQuery,
) -> Result<Paginated<ChatMessage>, ApiError> {
    api.get_query(&format!("/api/chats/{}/messages", seg(chat_id)), page)
        .await
}

/// REST fallback for sending; the relay still broadcasts the message.
pub async fn send_message(
    api: &ApiClient,
    chat_id: &str,
    req: &SendMessageRequest,
) -> Result<ChatMessage, ApiError> {
    api.post_json(&format!("/api/chats/{}/messages", seg(chat_id)), req)
        .await
}

pub async fn unread_count(api: &ApiClient) -> Result<u64, ApiError> {
    let resp: UnreadCount = api.get_json("/api/chats/unread-count").await?;
    Ok(resp.count)
}
