//! Business reviews and their moderation state.

use chrono::Utc;
use mylocal_shared::{
    AdminReviewFilter, CreateReviewRequest, PageQuery, Review, ReviewStatus, UpdateReviewRequest,
    REVIEW_FLAG_THRESHOLD,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::businesses::{self, refresh_rating};
use super::{parse_ts, ts, Filter, Store, StoreError, StoreResult};

const SELECT: &str = "SELECT r.id, r.business_id, r.user_id, u.name AS user_name, r.rating, r.title, r.comment,
    r.status, r.report_count, r.created_at, r.updated_at
    FROM reviews r LEFT JOIN users u ON u.id = r.user_id";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let status: String = row.get("status")?;
    Ok(Review {
        id: row.get("id")?,
        business_id: row.get("business_id")?,
        user_id: row.get("user_id")?,
        user_name: row.get("user_name")?,
        rating: row.get("rating")?,
        title: row.get("title")?,
        comment: row.get("comment")?,
        status: ReviewStatus::parse(&status).unwrap_or(ReviewStatus::Pending),
        report_count: row.get("report_count")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
}

fn load(conn: &Connection, id: &str) -> StoreResult<Review> {
    conn.query_row(&format!("{SELECT} WHERE r.id = ?1"), params![id], map_row)
        .optional()?
        .ok_or(StoreError::NotFound("Review"))
}

fn query_page(conn: &Connection, f: &Filter, page: &PageQuery) -> StoreResult<(Vec<Review>, u64)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM reviews r{}", f.sql()),
        params_from_iter(f.params.iter()),
        |r| r.get(0),
    )?;
    let sql = format!(
        "{SELECT}{} ORDER BY r.created_at DESC, r.id LIMIT {} OFFSET {}",
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
    pub async fn get_review(&self, id: &str) -> StoreResult<Review> {
        let conn = self.conn().await;
        load(&conn, id)
    }

    /// Insert a review; a second review by the same user for the same business is a conflict.
    pub async fn create_review(&self, business_id: &str, user_id: &str, req: &CreateReviewRequest) -> StoreResult<Review> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = ts(&Utc::now());
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        businesses::load(&tx, business_id)?;

        let inserted = tx.execute(
            "INSERT INTO reviews (id, business_id, user_id, rating, title, comment, status, report_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)",
            params![
                id,
                business_id,
                user_id,
                req.rating,
                req.title.trim(),
                req.comment.trim(),
                ReviewStatus::Approved.as_str(),
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if StoreError::is_constraint(&e) => {
                return Err(StoreError::Conflict("You have already reviewed this business".into()))
            }
            Err(e) => return Err(e.into()),
        }

        refresh_rating(&tx, business_id)?;
        let review = load(&tx, &id)?;
        tx.commit()?;
        Ok(review)
    }

    pub async fn update_review(&self, id: &str, update: &UpdateReviewRequest) -> StoreResult<Review> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let current = load(&tx, id)?;

        tx.execute(
            "UPDATE reviews SET
                rating = COALESCE(?2, rating),
                title = COALESCE(?3, title),
                comment = COALESCE(?4, comment),
                updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                update.rating,
                update.title.as_deref().map(str::trim),
                update.comment.as_deref().map(str::trim),
                ts(&Utc::now())
            ],
        )?;
        refresh_rating(&tx, &current.business_id)?;
        let review = load(&tx, id)?;
        tx.commit()?;
        Ok(review)
    }

    pub async fn delete_review(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let current = load(&tx, id)?;
        tx.execute("DELETE FROM reviews WHERE id = ?1", params![id])?;
        refresh_rating(&tx, &current.business_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Record a report; at the threshold an approved review becomes flagged.
    pub async fn report_review(&self, id: &str, reporter_id: &str) -> StoreResult<Review> {
        let now = ts(&Utc::now());
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let current = load(&tx, id)?;

        let inserted = tx.execute(
            "INSERT INTO review_reports (review_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, reporter_id, now],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if StoreError::is_constraint(&e) => {
                return Err(StoreError::Conflict("You have already reported this review".into()))
            }
            Err(e) => return Err(e.into()),
        }

        let count = current.report_count + 1;
        let status = if current.status == ReviewStatus::Approved && count >= REVIEW_FLAG_THRESHOLD {
            ReviewStatus::Flagged
        } else {
            current.status
        };
        tx.execute(
            "UPDATE reviews SET report_count = ?2, status = ?3 WHERE id = ?1",
            params![id, count, status.as_str()],
        )?;
        if status != current.status {
            refresh_rating(&tx, &current.business_id)?;
        }
        let review = load(&tx, id)?;
        tx.commit()?;
        Ok(review)
    }

    /// Moderation toggle. Approving clears the report counter.
    pub async fn set_review_status(&self, id: &str, status: ReviewStatus) -> StoreResult<Review> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let current = load(&tx, id)?;
        if status == ReviewStatus::Approved {
            tx.execute(
                "UPDATE reviews SET status = ?2, report_count = 0, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), ts(&Utc::now())],
            )?;
            tx.execute("DELETE FROM review_reports WHERE review_id = ?1", params![id])?;
        } else {
            tx.execute(
                "UPDATE reviews SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), ts(&Utc::now())],
            )?;
        }
        refresh_rating(&tx, &current.business_id)?;
        let review = load(&tx, id)?;
        tx.commit()?;
        Ok(review)
    }

    /// Approved reviews of one business, newest first.
    pub async fn list_business_reviews(&self, business_id: &str, page: &PageQuery) -> StoreResult<(Vec<Review>, u64)> {
        let mut f = Filter::new();
        f.push("r.business_id = ?", business_id.to_string());
        f.push("r.status = ?", ReviewStatus::Approved.as_str().to_string());
        let conn = self.conn().await;
        businesses::load(&conn, business_id)?;
        query_page(&conn, &f, page)
    }

    pub async fn admin_list_reviews(&self, filter: &AdminReviewFilter) -> StoreResult<(Vec<Review>, u64)> {
        let mut f = Filter::new();
        if let Some(status) = filter.status {
            f.push("r.status = ?", status.as_str().to_string());
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
    use mylocal_shared::{Address, BusinessCategory, CreateBusinessRequest, Role};

    async fn user(store: &Store, email: &str, role: Role) -> String {
        store
            .create_user(NewUser {
                name: email.split('@').next().unwrap_or("user").into(),
                email: email.into(),
                password_hash: "x".into(),
                role,
            })
            .await
            .unwrap()
            .id
    }

    async fn business(store: &Store, owner: &str) -> String {
        store
            .create_business(
                owner,
                CreateBusinessRequest {
                    name: "Corner Deli".into(),
                    description: String::new(),
                    category: BusinessCategory::Restaurant,
                    address: Address::default(),
                    phone: None,
                    email: None,
                    website: None,
                    hours: Default::default(),
                    images: vec![],
                },
            )
            .await
            .unwrap()
            .id
    }

    fn review(rating: u8) -> CreateReviewRequest {
        CreateReviewRequest {
            rating,
            title: "Visit".into(),
            comment: "Nice sandwiches".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_review_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let owner = user(&store, "owner@example.com", Role::Vendor).await;
        let customer = user(&store, "cus@example.com", Role::Customer).await;
        let biz = business(&store, &owner).await;

        store.create_review(&biz, &customer, &review(4)).await.unwrap();
        let err = store.create_review(&biz, &customer, &review(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn rating_tracks_approved_reviews() {
        let store = Store::open_in_memory().unwrap();
        let owner = user(&store, "owner@example.com", Role::Vendor).await;
        let a = user(&store, "a@example.com", Role::Customer).await;
        let b = user(&store, "b@example.com", Role::Customer).await;
        let biz = business(&store, &owner).await;

        store.create_review(&biz, &a, &review(5)).await.unwrap();
        let second = store.create_review(&biz, &b, &review(2)).await.unwrap();
        let rating = store.get_business(&biz).await.unwrap().rating;
        assert_eq!(rating.count, 2);
        assert!((rating.average - 3.5).abs() < f64::EPSILON);

        store.set_review_status(&second.id, ReviewStatus::Flagged).await.unwrap();
        let rating = store.get_business(&biz).await.unwrap().rating;
        assert_eq!(rating.count, 1);
        assert!((rating.average - 5.0).abs() < f64::EPSILON);

        store.delete_review(&second.id).await.unwrap();
        let (listed, total) = store.list_business_reviews(&biz, &PageQuery::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(listed[0].user_name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn reports_flag_at_threshold() {
        let store = Store::open_in_memory().unwrap();
        let owner = user(&store, "owner@example.com", Role::Vendor).await;
        let author = user(&store, "author@example.com", Role::Customer).await;
        let biz = business(&store, &owner).await;
        let r = store.create_review(&biz, &author, &review(1)).await.unwrap();

        let mut last = None;
        for i in 0..REVIEW_FLAG_THRESHOLD {
            let reporter = user(&store, &format!("r{i}@example.com"), Role::Customer).await;
            last = Some(store.report_review(&r.id, &reporter).await.unwrap());
        }
        let flagged = last.unwrap();
        assert_eq!(flagged.status, ReviewStatus::Flagged);
        assert_eq!(flagged.report_count, REVIEW_FLAG_THRESHOLD);

        let again = store.report_review(&r.id, &owner).await.unwrap();
        assert_eq!(again.report_count, REVIEW_FLAG_THRESHOLD + 1);
        let err = store.report_review(&r.id, &owner).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let approved = store.set_review_status(&r.id, ReviewStatus::Approved).await.unwrap();
        assert_eq!(approved.report_count, 0);
    }

    #[tokio::test]
    async fn deleting_business_cascades_reviews() {
        let store = Store::open_in_memory().unwrap();
        let owner = user(&store, "owner@example.com", Role::Vendor).await;
        let customer = user(&store, "cus@example.com", Role::Customer).await;
        let biz = business(&store, &owner).await;
        let r = store.create_review(&biz, &customer, &review(3)).await.unwrap();

        store.delete_business(&biz).await.unwrap();
        assert!(matches!(store.get_review(&r.id).await, Err(StoreError::NotFound(_))));
    }
}
