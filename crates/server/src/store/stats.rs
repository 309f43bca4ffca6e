use mylocal_shared::AdminStats;

use super::{Store, StoreResult};

impl Store {
    /// Dashboard counters for the moderation panel.
    pub async fn admin_stats(&self) -> StoreResult<AdminStats> {
        let conn = self.conn().await;
        let count = |sql: &str| -> StoreResult<u64> {
            let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n as u64)
        };
        Ok(AdminStats {
            users: count("SELECT COUNT(*) FROM users")?,
            customers: count("SELECT COUNT(*) FROM users WHERE role = 'customer'")?,
            vendors: count("SELECT COUNT(*) FROM users WHERE role = 'vendor'")?,
            admins: count("SELECT COUNT(*) FROM users WHERE role = 'admin'")?,
            businesses: count("SELECT COUNT(*) FROM businesses")?,
            reviews: count("SELECT COUNT(*) FROM reviews")?,
            flagged_reviews: count("SELECT COUNT(*) FROM reviews WHERE status = 'flagged'")?,
            pending_reviews: count("SELECT COUNT(*) FROM reviews WHERE status = 'pending'")?,
            posts: count("SELECT COUNT(*) FROM posts")?,
            chats: count("SELECT COUNT(*) FROM chats")?,
        })
    }
}
