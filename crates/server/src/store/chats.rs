//! Direct-message chats and their messages.

use chrono::{DateTime, Utc};
use mylocal_shared::{
    Chat, ChatMessage, ChatMessageType, LastMessage, PageQuery, ReadReceipt,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{parse_ts, parse_ts_opt, ts, Store, StoreError, StoreResult};

/// Fields of a message supplied by the sender.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_type: ChatMessageType,
    pub content: String,
    pub attachment_url: Option<String>,
}

/// Identity of a chat: its sorted participant set plus business context.
pub fn participant_key(participants: &[String], business_id: Option<&str>) -> String {
    let mut ids: Vec<&str> = participants.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    format!("{}|{}", ids.join(","), business_id.unwrap_or(""))
}

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, message_type, content, attachment_url, read_by,
    is_edited, edited_at, is_deleted, deleted_at, version, created_at";

fn map_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let message_type: String = row.get("message_type")?;
    let read_by: String = row.get("read_by")?;
    Ok(ChatMessage {
        id: row.get("id")?,
        chat_id: row.get("chat_id")?,
        sender_id: row.get("sender_id")?,
        message_type: ChatMessageType::parse(&message_type).unwrap_or_default(),
        content: row.get("content")?,
        attachment_url: row.get("attachment_url")?,
        read_by: serde_json::from_str(&read_by).unwrap_or_default(),
        is_edited: row.get("is_edited")?,
        edited_at: parse_ts_opt(row.get("edited_at")?),
        is_deleted: row.get("is_deleted")?,
        deleted_at: parse_ts_opt(row.get("deleted_at")?),
        version: row.get("version")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

fn load_message(conn: &Connection, id: &str) -> StoreResult<ChatMessage> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        params![id],
        map_message,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Message"))
}

fn load_chat(conn: &Connection, id: &str) -> StoreResult<Chat> {
    let row = conn
        .query_row(
            "SELECT id, business_id, last_message, created_at, updated_at FROM chats WHERE id = ?1",
            params![id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound("Chat"))?;
    let (id, business_id, last_message, created_at, updated_at) = row;

    let mut stmt = conn.prepare(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map(params![id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    let last_message: Option<LastMessage> = match last_message {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    Ok(Chat {
        id,
        participants,
        business_id,
        last_message,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

impl Store {
    /// Returns the existing chat for this participant set and business, or
    /// creates one. The flag is true when a chat was created.
    pub async fn create_or_get_chat(
        &self,
        participants: &[String],
        business_id: Option<&str>,
    ) -> StoreResult<(Chat, bool)> {
        let key = participant_key(participants, business_id);
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM chats WHERE participant_key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            let chat = load_chat(&tx, &id)?;
            return Ok((chat, false));
        }

        let placeholders = vec!["?"; participants.len()].join(", ");
        let known: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM users WHERE id IN ({placeholders}) AND is_active = 1"),
            params_from_iter(participants.iter()),
            |r| r.get(0),
        )?;
        if known as usize != participants.len() {
            return Err(StoreError::NotFound("User"));
        }
        if let Some(business_id) = business_id {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM businesses WHERE id = ?1)",
                params![business_id],
                |r| r.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound("Business"));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = ts(&Utc::now());
        tx.execute(
            "INSERT INTO chats (id, participant_key, business_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, key, business_id, now],
        )?;
        for (position, user_id) in participants.iter().enumerate() {
            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
                params![id, user_id, position as i64],
            )?;
        }
        let chat = load_chat(&tx, &id)?;
        tx.commit()?;
        Ok((chat, true))
    }

    pub async fn get_chat(&self, id: &str) -> StoreResult<Chat> {
        let conn = self.conn().await;
        load_chat(&conn, id)
    }

    /// Chats `user_id` takes part in, most recently updated first.
    pub async fn list_user_chats(&self, user_id: &str, page: &PageQuery) -> StoreResult<(Vec<Chat>, u64)> {
        let conn = self.conn().await;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_participants WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.id FROM chats c JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?1 ORDER BY c.updated_at DESC, c.id LIMIT {} OFFSET {}",
            page.limit(),
            page.offset()
        ))?;
        let ids = stmt
            .query_map(params![user_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        let chats = ids
            .iter()
            .map(|id| load_chat(&conn, id))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((chats, total as u64))
    }

    /// Append a message and refresh the chat's `lastMessage`.
    pub async fn insert_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        new: NewMessage,
    ) -> StoreResult<(ChatMessage, Chat)> {
        let now = Utc::now();
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            message_type: new.message_type,
            content: new.content,
            attachment_url: new.attachment_url,
            read_by: vec![],
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            version: 1,
            created_at: now,
        };
        let last = LastMessage::from_message(&message);

        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, message_type, content, attachment_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.chat_id,
                message.sender_id,
                message.message_type.as_str(),
                message.content,
                message.attachment_url,
                ts(&now),
            ],
        )?;
        let changed = tx.execute(
            "UPDATE chats SET last_message = ?2, updated_at = ?3 WHERE id = ?1",
            params![chat_id, serde_json::to_string(&last)?, ts(&now)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("Chat"));
        }
        let chat = load_chat(&tx, chat_id)?;
        tx.commit()?;
        Ok((message, chat))
    }

    pub async fn get_message(&self, id: &str) -> StoreResult<ChatMessage> {
        let conn = self.conn().await;
        load_message(&conn, id)
    }

    /// Messages in chronological order. Page 1 is the newest page, so
    /// scrolling back through history means increasing the page number.
    pub async fn list_messages(&self, chat_id: &str, page: &PageQuery) -> StoreResult<(Vec<ChatMessage>, u64)> {
        let conn = self.conn().await;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1
             ORDER BY seq DESC LIMIT {} OFFSET {}",
            page.limit(),
            page.offset()
        ))?;
        let mut messages = stmt
            .query_map(params![chat_id], map_message)?
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok((messages, total as u64))
    }

    /// Replace the content and bump the version. With `expected_version`
    /// set, the edit only applies when it matches the stored version.
    pub async fn edit_message(
        &self,
        id: &str,
        content: &str,
        expected_version: Option<u32>,
    ) -> StoreResult<ChatMessage> {
        let conn = self.conn().await;
        let changed = conn.execute(
            "UPDATE messages SET content = ?2, is_edited = 1, edited_at = ?3, version = version + 1
             WHERE id = ?1 AND is_deleted = 0 AND (?4 IS NULL OR version = ?4)",
            params![id, content, ts(&Utc::now()), expected_version],
        )?;
        if changed == 0 {
            let current = load_message(&conn, id)?;
            if current.is_deleted {
                return Err(StoreError::Conflict("Message has been deleted".into()));
            }
            return Err(StoreError::Conflict("Message was modified by another client".into()));
        }
        load_message(&conn, id)
    }

    /// Soft delete: content is blanked, the row stays in place. Deleting
    /// twice is a no-op.
    pub async fn soft_delete_message(&self, id: &str) -> StoreResult<ChatMessage> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE messages SET content = '', attachment_url = NULL, is_deleted = 1,
                deleted_at = ?2, version = version + 1
             WHERE id = ?1 AND is_deleted = 0",
            params![id, ts(&Utc::now())],
        )?;
        load_message(&conn, id)
    }

    /// Add a read receipt for `reader` to the given messages (all when
    /// empty) it did not send. Returns the ids that changed.
    pub async fn mark_read(
        &self,
        chat_id: &str,
        reader: &str,
        message_ids: &[String],
    ) -> StoreResult<(Vec<String>, DateTime<Utc>)> {
        let read_at = Utc::now();
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        let candidates = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 AND sender_id != ?2 AND is_deleted = 0 ORDER BY seq"
            ))?;
            let rows = stmt
                .query_map(params![chat_id, reader], map_message)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut marked = Vec::new();
        for mut message in candidates {
            if !message_ids.is_empty() && !message_ids.contains(&message.id) {
                continue;
            }
            if message.is_read_by(reader) {
                continue;
            }
            message.read_by.push(ReadReceipt {
                user_id: reader.to_string(),
                read_at,
            });
            tx.execute(
                "UPDATE messages SET read_by = ?2 WHERE id = ?1",
                params![message.id, serde_json::to_string(&message.read_by)?],
            )?;
            marked.push(message.id);
        }
        tx.commit()?;
        Ok((marked, read_at))
    }

    /// Messages across all of `user_id`'s chats that it has not read.
    pub async fn unread_count(&self, user_id: &str) -> StoreResult<u64> {
        let conn = self.conn().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN chat_participants p ON p.chat_id = m.chat_id AND p.user_id = ?1
             WHERE m.sender_id != ?1 AND m.is_deleted = 0
               AND NOT EXISTS (
                   SELECT 1 FROM json_each(m.read_by)
                   WHERE json_extract(json_each.value, '$.userId') = ?1
               )",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }
}
