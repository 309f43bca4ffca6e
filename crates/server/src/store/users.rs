//! User accounts.

use chrono::Utc;
use mylocal_shared::{AdminUserFilter, PageQuery, Role, UpdateProfileRequest, User};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{like_pattern, parse_ts, ts, Filter, Store, StoreError, StoreResult};

/// A user row including the password hash, which never leaves the server.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

const COLUMNS: &str = "id, name, email, password_hash, role, phone, avatar, bio, location, is_active, created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role: String = row.get("role")?;
    Ok(UserRecord {
        user: User {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            role: Role::parse(&role).unwrap_or(Role::Customer),
            phone: row.get("phone")?,
            avatar: row.get("avatar")?,
            bio: row.get("bio")?,
            location: row.get("location")?,
            is_active: row.get("is_active")?,
            created_at: parse_ts(&row.get::<_, String>("created_at")?),
            updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
        },
        password_hash: row.get("password_hash")?,
    })
}

impl Store {
    pub async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let email = new.email.trim().to_lowercase();
        let conn = self.conn().await;

        let inserted = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![id, new.name.trim(), email, new.password_hash, new.role.as_str(), ts(&now)],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if StoreError::is_constraint(&e) => {
                return Err(StoreError::Conflict("An account with this email already exists".into()))
            }
            Err(e) => return Err(e.into()),
        }

        let record = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_row,
        )?;
        Ok(record.user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn().await;
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE email = ?1"),
                params![email.trim().to_lowercase()],
                map_row,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn find_user(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn().await;
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Apply only the fields present in `update`.
    pub async fn update_profile(&self, id: &str, update: &UpdateProfileRequest) -> StoreResult<User> {
        let now = ts(&Utc::now());
        let conn = self.conn().await;
        let changed = conn.execute(
            "UPDATE users SET
                name = COALESCE(?2, name),
                phone = COALESCE(?3, phone),
                avatar = COALESCE(?4, avatar),
                bio = COALESCE(?5, bio),
                location = COALESCE(?6, location),
                updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                update.name.as_deref().map(str::trim),
                update.phone,
                update.avatar,
                update.bio,
                update.location,
                now
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("User"));
        }
        let record = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_row,
        )?;
        Ok(record.user)
    }

    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<()> {
        let conn = self.conn().await;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, password_hash, ts(&Utc::now())],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("User"));
        }
        Ok(())
    }

    pub async fn admin_update_user(&self, id: &str, role: Option<Role>, is_active: Option<bool>) -> StoreResult<User> {
        let conn = self.conn().await;
        let changed = conn.execute(
            "UPDATE users SET
                role = COALESCE(?2, role),
                is_active = COALESCE(?3, is_active),
                updated_at = ?4
             WHERE id = ?1",
            params![id, role.map(|r| r.as_str()), is_active, ts(&Utc::now())],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("User"));
        }
        let record = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_row,
        )?;
        Ok(record.user)
    }

    /// Hard delete; owned businesses, reviews, posts and messages cascade.
    pub async fn delete_user(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn().await;
        let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound("User"));
        }
        Ok(())
    }

    pub async fn list_users(&self, filter: &AdminUserFilter) -> StoreResult<(Vec<User>, u64)> {
        let page = PageQuery {
            page: filter.page,
            limit: filter.limit,
        };
        let mut f = Filter::new();
        if let Some(role) = filter.role {
            f.push("role = ?", role.as_str().to_string());
        }
        if let Some(active) = filter.is_active {
            f.push("is_active = ?", active);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            f.push_repeated(
                "(lower(name) LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')",
                like_pattern(search),
                2,
            );
        }

        let conn = self.conn().await;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users{}", f.sql()),
            params_from_iter(f.params.iter()),
            |r| r.get(0),
        )?;

        let sql = format!(
            "SELECT {COLUMNS} FROM users{} ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
            f.sql(),
            page.limit(),
            page.offset()
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(f.params.iter()), map_row)?
            .map(|r| r.map(|rec| rec.user))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total as u64))
    }

    /// Display names for a set of user ids; unknown ids are skipped.
    pub async fn user_names(&self, ids: &[String]) -> StoreResult<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name FROM users WHERE id IN ({placeholders})"
        ))?;
        let names = stmt
            .query_map(params_from_iter(ids.iter()), |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
