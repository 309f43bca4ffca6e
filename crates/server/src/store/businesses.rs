//! Business listings.

use chrono::Utc;
use mylocal_shared::{
    Address, AdminBusinessFilter, Business, BusinessCategory, BusinessFilter, BusinessSort,
    CreateBusinessRequest, PageQuery, RatingSummary, UpdateBusinessRequest,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{like_pattern, parse_ts, ts, Filter, Store, StoreError, StoreResult};

const COLUMNS: &str = "id, owner_id, name, description, category, street, city, state, zip_code, phone, email, website, hours, images, rating_average, rating_count, is_active, is_verified, created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Business> {
    let category: String = row.get("category")?;
    let hours: String = row.get("hours")?;
    let images: String = row.get("images")?;
    Ok(Business {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        category: BusinessCategory::parse(&category).unwrap_or(BusinessCategory::Other),
        address: Address {
            street: row.get("street")?,
            city: row.get("city")?,
            state: row.get("state")?,
            zip_code: row.get("zip_code")?,
        },
        phone: row.get("phone")?,
        email: row.get("email")?,
        website: row.get("website")?,
        hours: serde_json::from_str(&hours).unwrap_or_default(),
        images: serde_json::from_str(&images).unwrap_or_default(),
        rating: RatingSummary {
            average: row.get("rating_average")?,
            count: row.get("rating_count")?,
        },
        is_active: row.get("is_active")?,
        is_verified: row.get("is_verified")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
}

pub(crate) fn load(conn: &Connection, id: &str) -> StoreResult<Business> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM businesses WHERE id = ?1"),
        params![id],
        map_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Business"))
}

/// Recompute the cached rating from the business's approved reviews.
pub(crate) fn refresh_rating(conn: &Connection, business_id: &str) -> StoreResult<RatingSummary> {
    let mut stmt = conn.prepare(
        "SELECT rating FROM reviews WHERE business_id = ?1 AND status = 'approved'",
    )?;
    let ratings = stmt
        .query_map(params![business_id], |r| r.get::<_, u8>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let summary = RatingSummary::from_ratings(&ratings);
    conn.execute(
        "UPDATE businesses SET rating_average = ?2, rating_count = ?3 WHERE id = ?1",
        params![business_id, summary.average, summary.count],
    )?;
    Ok(summary)
}

fn write_all(conn: &Connection, b: &Business) -> StoreResult<()> {
    conn.execute(
        "UPDATE businesses SET
            name = ?2, description = ?3, category = ?4,
            street = ?5, city = ?6, state = ?7, zip_code = ?8,
            phone = ?9, email = ?10, website = ?11,
            hours = ?12, images = ?13, updated_at = ?14
         WHERE id = ?1",
        params![
            b.id,
            b.name,
            b.description,
            b.category.as_str(),
            b.address.street,
            b.address.city,
            b.address.state,
            b.address.zip_code,
            b.phone,
            b.email,
            b.website,
            serde_json::to_string(&b.hours)?,
            serde_json::to_string(&b.images)?,
            ts(&b.updated_at),
        ],
    )?;
    Ok(())
}

fn query_page(
    conn: &Connection,
    f: &Filter,
    order: &str,
    page: &PageQuery,
) -> StoreResult<(Vec<Business>, u64)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM businesses{}", f.sql()),
        params_from_iter(f.params.iter()),
        |r| r.get(0),
    )?;
    let sql = format!(
        "SELECT {COLUMNS} FROM businesses{} ORDER BY {order}, id LIMIT {} OFFSET {}",
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
    pub async fn create_business(&self, owner_id: &str, req: CreateBusinessRequest) -> StoreResult<Business> {
        let now = ts(&Utc::now());
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO businesses (id, owner_id, name, description, category, street, city, state, zip_code,
                phone, email, website, hours, images, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                id,
                owner_id,
                req.name.trim(),
                req.description,
                req.category.as_str(),
                req.address.street,
                req.address.city,
                req.address.state,
                req.address.zip_code,
                req.phone,
                req.email,
                req.website,
                serde_json::to_string(&req.hours)?,
                serde_json::to_string(&req.images)?,
                now,
            ],
        )?;
        load(&conn, &id)
    }

    pub async fn get_business(&self, id: &str) -> StoreResult<Business> {
        let conn = self.conn().await;
        load(&conn, id)
    }

    /// Merge the submitted fields into the stored business.
    pub async fn update_business(&self, id: &str, update: UpdateBusinessRequest) -> StoreResult<Business> {
        let conn = self.conn().await;
        let mut business = load(&conn, id)?;

        if let Some(name) = update.name {
            business.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            business.description = description;
        }
        if let Some(category) = update.category {
            business.category = category;
        }
        if let Some(address) = update.address {
            business.address = address;
        }
        if let Some(phone) = update.phone {
            business.phone = Some(phone);
        }
        if let Some(email) = update.email {
            business.email = Some(email);
        }
        if let Some(website) = update.website {
            business.website = Some(website);
        }
        if let Some(hours) = update.hours {
            business.hours = hours;
        }
        if let Some(images) = update.images {
            business.images = images;
        }
        business.updated_at = Utc::now();

        write_all(&conn, &business)?;
        load(&conn, id)
    }

    /// Delete a business; its reviews are removed by the foreign-key cascade.
    pub async fn delete_business(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn().await;
        let changed = conn.execute("DELETE FROM businesses WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound("Business"));
        }
        Ok(())
    }

    /// Public directory listing: active businesses only.
    pub async fn list_businesses(&self, filter: &BusinessFilter) -> StoreResult<(Vec<Business>, u64)> {
        let mut f = Filter::new();
        f.push_raw("is_active = 1");
        if let Some(category) = filter.category {
            f.push("category = ?", category.as_str().to_string());
        }
        if let Some(city) = filter.city.as_deref().filter(|c| !c.trim().is_empty()) {
            f.push("lower(city) = ?", city.trim().to_lowercase());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            f.push_repeated(
                "(lower(name) LIKE ? ESCAPE '\\' OR lower(description) LIKE ? ESCAPE '\\')",
                like_pattern(search),
                2,
            );
        }
        if let Some(min) = filter.min_rating {
            f.push("rating_average >= ?", min);
        }
        let order = match filter.sort.unwrap_or(BusinessSort::Newest) {
            BusinessSort::Rating => "rating_average DESC, rating_count DESC, created_at DESC",
            BusinessSort::Newest => "created_at DESC",
            BusinessSort::Name => "lower(name) ASC",
        };

        let conn = self.conn().await;
        query_page(&conn, &f, order, &filter.page_query())
    }

    pub async fn list_owner_businesses(&self, owner_id: &str, page: &PageQuery) -> StoreResult<(Vec<Business>, u64)> {
        let mut f = Filter::new();
        f.push("owner_id = ?", owner_id.to_string());
        let conn = self.conn().await;
        query_page(&conn, &f, "created_at DESC", page)
    }

    pub async fn admin_list_businesses(&self, filter: &AdminBusinessFilter) -> StoreResult<(Vec<Business>, u64)> {
        let mut f = Filter::new();
        if let Some(category) = filter.category {
            f.push("category = ?", category.as_str().to_string());
        }
        if let Some(verified) = filter.is_verified {
            f.push("is_verified = ?", verified);
        }
        if let Some(active) = filter.is_active {
            f.push("is_active = ?", active);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            f.push("lower(name) LIKE ? ESCAPE '\\'", like_pattern(search));
        }
        let page = PageQuery {
            page: filter.page,
            limit: filter.limit,
        };
        let conn = self.conn().await;
        query_page(&conn, &f, "created_at DESC", &page)
    }

    pub async fn admin_update_business(
        &self,
        id: &str,
        is_verified: Option<bool>,
        is_active: Option<bool>,
    ) -> StoreResult<Business> {
        let conn = self.conn().await;
        let changed = conn.execute(
            "UPDATE businesses SET
                is_verified = COALESCE(?2, is_verified),
                is_active = COALESCE(?3, is_active),
                updated_at = ?4
             WHERE id = ?1",
            params![id, is_verified, is_active, ts(&Utc::now())],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("Business"));
        }
        load(&conn, id)
    }
}
