//! Community posts with embedded likes and comments.

use chrono::Utc;
use mylocal_shared::{
    normalize_tags, AdminPostFilter, Comment, CreatePostRequest, PageQuery, Post, PostCategory,
    PostFilter, PostStatus, UpdatePostRequest,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{like_pattern, parse_ts, ts, Filter, Store, StoreError, StoreResult};

const SELECT: &str = "SELECT p.id, p.author_id, u.name AS author_name, p.title, p.content, p.category,
    p.tags, p.likes, p.comments, p.status, p.created_at, p.updated_at
    FROM posts p LEFT JOIN users u ON u.id = p.author_id";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let category: String = row.get("category")?;
    let status: String = row.get("status")?;
    let tags: String = row.get("tags")?;
    let likes: String = row.get("likes")?;
    let comments: String = row.get("comments")?;
    Ok(Post {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        author_name: row.get("author_name")?,
        title: row.get("title")?,
        content: row.get("content")?,
        category: PostCategory::parse(&category).unwrap_or(PostCategory::General),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        likes: serde_json::from_str(&likes).unwrap_or_default(),
        comments: serde_json::from_str(&comments).unwrap_or_default(),
        status: PostStatus::parse(&status).unwrap_or(PostStatus::Active),
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
}

fn load(conn: &Connection, id: &str) -> StoreResult<Post> {
    conn.query_row(&format!("{SELECT} WHERE p.id = ?1"), params![id], map_row)
        .optional()?
        .ok_or(StoreError::NotFound("Post"))
}

fn write_all(conn: &Connection, post: &Post) -> StoreResult<()> {
    conn.execute(
        "UPDATE posts SET title = ?2, content = ?3, category = ?4, tags = ?5, likes = ?6,
            comments = ?7, status = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            post.id,
            post.title,
            post.content,
            post.category.as_str(),
            serde_json::to_string(&post.tags)?,
            serde_json::to_string(&post.likes)?,
            serde_json::to_string(&post.comments)?,
            post.status.as_str(),
            ts(&post.updated_at),
        ],
    )?;
    Ok(())
}

/// Add `user_id` to `likes` if absent, remove it otherwise. Returns the new state.
pub fn toggle(likes: &mut Vec<String>, user_id: &str) -> bool {
    if let Some(pos) = likes.iter().position(|u| u == user_id) {
        likes.remove(pos);
        false
    } else {
        likes.push(user_id.to_string());
        true
    }
}

fn query_page(conn: &Connection, f: &Filter, page: &PageQuery) -> StoreResult<(Vec<Post>, u64)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p{}", f.sql()),
        params_from_iter(f.params.iter()),
        |r| r.get(0),
    )?;
    let sql = format!(
        "{SELECT}{} ORDER BY p.created_at DESC, p.id LIMIT {} OFFSET {}",
        f.sql(),
        page.limit(),
        page.offset()
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(f.params.iter()), map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((items, total as u64))
}

impl Store {
    pub async fn create_post(&self, author_id: &str, req: &CreatePostRequest) -> StoreResult<Post> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = ts(&Utc::now());
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO posts (id, author_id, title, content, category, tags, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                author_id,
                req.title.trim(),
                req.content,
                req.category.unwrap_or(PostCategory::General).as_str(),
                serde_json::to_string(&normalize_tags(&req.tags))?,
                PostStatus::Active.as_str(),
                now,
            ],
        )?;
        load(&conn, &id)
    }

    pub async fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn().await;
        load(&conn, id)
    }

    /// Load, mutate and write back a post under one transaction.
    async fn modify_post<R>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Post) -> StoreResult<R>,
    ) -> StoreResult<(Post, R)> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let mut post = load(&tx, id)?;
        let out = apply(&mut post)?;
        post.updated_at = Utc::now();
        write_all(&tx, &post)?;
        let post = load(&tx, id)?;
        tx.commit()?;
        Ok((post, out))
    }

    /// Only submitted fields change.
    pub async fn update_post(&self, id: &str, update: UpdatePostRequest) -> StoreResult<Post> {
        let (post, ()) = self
            .modify_post(id, |post| {
                if let Some(title) = update.title {
                    post.title = title.trim().to_string();
                }
                if let Some(content) = update.content {
                    post.content = content;
                }
                if let Some(category) = update.category {
                    post.category = category;
                }
                if let Some(tags) = update.tags {
                    post.tags = normalize_tags(&tags);
                }
                Ok(())
            })
            .await?;
        Ok(post)
    }

    pub async fn delete_post(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn().await;
        let changed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound("Post"));
        }
        Ok(())
    }

    pub async fn toggle_post_like(&self, id: &str, user_id: &str) -> StoreResult<(Post, bool)> {
        self.modify_post(id, |post| Ok(toggle(&mut post.likes, user_id))).await
    }

    pub async fn add_comment(&self, post_id: &str, user_id: &str, content: &str) -> StoreResult<(Post, Comment)> {
        let now = Utc::now();
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.trim().to_string(),
            likes: vec![],
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        self.modify_post(post_id, |post| {
            post.comments.push(comment.clone());
            Ok(comment)
        })
        .await
    }

    pub async fn edit_comment(&self, post_id: &str, comment_id: &str, content: &str) -> StoreResult<(Post, Comment)> {
        self.modify_post(post_id, |post| {
            let comment = post
                .comments
                .iter_mut()
                .find(|c| c.id == comment_id)
                .ok_or(StoreError::NotFound("Comment"))?;
            comment.content = content.trim().to_string();
            comment.is_edited = true;
            comment.updated_at = Utc::now();
            Ok(comment.clone())
        })
        .await
    }

    pub async fn delete_comment(&self, post_id: &str, comment_id: &str) -> StoreResult<Post> {
        let (post, ()) = self
            .modify_post(post_id, |post| {
                let before = post.comments.len();
                post.comments.retain(|c| c.id != comment_id);
                if post.comments.len() == before {
                    return Err(StoreError::NotFound("Comment"));
                }
                Ok(())
            })
            .await?;
        Ok(post)
    }

    pub async fn toggle_comment_like(&self, post_id: &str, comment_id: &str, user_id: &str) -> StoreResult<(Post, bool)> {
        self.modify_post(post_id, |post| {
            let comment = post
                .comments
                .iter_mut()
                .find(|c| c.id == comment_id)
                .ok_or(StoreError::NotFound("Comment"))?;
            Ok(toggle(&mut comment.likes, user_id))
        })
        .await
    }

    pub async fn set_post_status(&self, id: &str, status: PostStatus) -> StoreResult<Post> {
        let (post, ()) = self
            .modify_post(id, |post| {
                post.status = status;
                Ok(())
            })
            .await?;
        Ok(post)
    }

    /// Public feed: everything except hidden posts, newest first.
    pub async fn list_posts(&self, filter: &PostFilter) -> StoreResult<(Vec<Post>, u64)> {
        let mut f = Filter::new();
        f.push("p.status != ?", PostStatus::Hidden.as_str().to_string());
        if let Some(category) = filter.category {
            f.push("p.category = ?", category.as_str().to_string());
        }
        if let Some(tag) = filter.tag.as_deref().filter(|t| !t.trim().is_empty()) {
            f.push(
                "EXISTS (SELECT 1 FROM json_each(p.tags) WHERE json_each.value = ?)",
                tag.trim().to_lowercase(),
            );
        }
        if let Some(author) = filter.author.as_deref().filter(|a| !a.is_empty()) {
            f.push("p.author_id = ?", author.to_string());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            f.push_repeated(
                "(lower(p.title) LIKE ? ESCAPE '\\' OR lower(p.content) LIKE ? ESCAPE '\\')",
                like_pattern(search),
                2,
            );
        }
        let conn = self.conn().await;
        query_page(&conn, &f, &filter.page_query())
    }

    pub async fn admin_list_posts(&self, filter: &AdminPostFilter) -> StoreResult<(Vec<Post>, u64)> {
        let mut f = Filter::new();
        if let Some(status) = filter.status {
            f.push("p.status = ?", status.as_str().to_string());
        }
        let page = PageQuery {
            page: filter.page,
            limit: filter.limit,
        };
        let conn = self.conn().await;
        query_page(&conn, &f, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::NewUser;
    use mylocal_shared::Role;

    async fn author(store: &Store) -> String {
        store
            .create_user(NewUser {
                name: "Pat".into(),
                email: "pat@example.com".into(),
                password_hash: "x".into(),
                role: Role::Customer,
            })
            .await
            .unwrap()
            .id
    }

    fn post(title: &str, tags: &[&str]) -> CreatePostRequest {
        CreatePostRequest {
            title: title.into(),
            content: "Farmers market this Saturday".into(),
            category: Some(PostCategory::Event),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut likes = vec![];
        assert!(toggle(&mut likes, "u1"));
        assert_eq!(likes, vec!["u1"]);
        assert!(!toggle(&mut likes, "u1"));
        assert!(likes.is_empty());
    }

    #[tokio::test]
    async fn edit_keeps_unsubmitted_fields() {
        let store = Store::open_in_memory().unwrap();
        let me = author(&store).await;
        let created = store.create_post(&me, &post("Market", &["Food", "food"])).await.unwrap();
        assert_eq!(created.tags, vec!["food"]);
        assert_eq!(created.author_name.as_deref(), Some("Pat"));

        let updated = store
            .update_post(
                &created.id,
                UpdatePostRequest {
                    title: Some("Market day".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Market day");
        assert_eq!(updated.content, created.content);
        assert_eq!(updated.category, PostCategory::Event);
        assert_eq!(updated.tags, vec!["food"]);
    }

    #[tokio::test]
    async fn comments_are_independently_editable() {
        let store = Store::open_in_memory().unwrap();
        let me = author(&store).await;
        let p = store.create_post(&me, &post("Market", &[])).await.unwrap();

        let (_, first) = store.add_comment(&p.id, &me, "See you there").await.unwrap();
        let (_, second) = store.add_comment(&p.id, &me, "Bring bags").await.unwrap();
        let (after_edit, edited) = store.edit_comment(&p.id, &first.id, "See you!").await.unwrap();
        assert!(edited.is_edited);
        assert_eq!(after_edit.comments[1].content, "Bring bags");

        let (_, liked) = store.toggle_comment_like(&p.id, &second.id, &me).await.unwrap();
        assert!(liked);

        let after_delete = store.delete_comment(&p.id, &first.id).await.unwrap();
        assert_eq!(after_delete.comments.len(), 1);
        assert_eq!(after_delete.comments[0].likes, vec![me.clone()]);
        assert!(matches!(
            store.delete_comment(&p.id, &first.id).await,
            Err(StoreError::NotFound("Comment"))
        ));
    }

    #[tokio::test]
    async fn feed_filters_by_tag_and_hides_hidden_posts() {
        let store = Store::open_in_memory().unwrap();
        let me = author(&store).await;
        let a = store.create_post(&me, &post("A", &["food"])).await.unwrap();
        store.create_post(&me, &post("B", &["music"])).await.unwrap();

        let (items, total) = store
            .list_posts(&PostFilter {
                tag: Some("Food".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, a.id);

        store.set_post_status(&a.id, PostStatus::Hidden).await.unwrap();
        let (_, total) = store.list_posts(&PostFilter::default()).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn pages_are_stable_when_timestamps_tie() {
        let store = Store::open_in_memory().unwrap();
        let me = author(&store).await;
        let mut created = Vec::new();
        for title in ["A", "B", "C", "D", "E"] {
            created.push(store.create_post(&me, &post(title, &[])).await.unwrap().id);
        }
        store
            .conn()
            .await
            .execute("UPDATE posts SET created_at = '2024-05-01T10:00:00.000000Z'", [])
            .unwrap();

        let mut seen = Vec::new();
        for page in 1..=3 {
            let (items, total) = store
                .list_posts(&PostFilter {
                    page: Some(page),
                    limit: Some(2),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(total, 5);
            seen.extend(items.into_iter().map(|p| p.id));
        }
        created.sort();
        assert_eq!(seen, created);
    }
}
