use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

const USER_COLUMNS: &str = "id, name, email, password_hash, location, phone, land_area, \
     avatar_url, notifications, reset_token_hash, reset_token_expires_at, created_at";

impl User {
    /// Find a user by email. Callers normalize the email beforehand.
    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create a new user with hashed password. Duplicate emails surface as a
    /// unique violation from the store, never as a read-then-write race here.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash)
             VALUES ($1, $2, $3)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Store the reset-token digest and its expiry on the user row.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = $2, reset_token_expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn find_by_reset_token_hash(
        db: &PgPool,
        token_hash: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(db)
        .await
    }

    /// Lazy cleanup for a token found expired at validation time.
    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = NULL, reset_token_expires_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Atomically consume a reset token: set the new password hash and clear
    /// both reset fields in one conditional update. The WHERE clause is the
    /// double-spend guard; a second concurrent attempt with the same token
    /// matches zero rows.
    pub async fn consume_reset_token(
        db: &PgPool,
        token_hash: &str,
        new_password_hash: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET password_hash = $2, reset_token_hash = NULL, reset_token_expires_at = NULL
             WHERE reset_token_hash = $1 AND reset_token_expires_at > now()
             RETURNING {USER_COLUMNS}"
        ))
        .bind(token_hash)
        .bind(new_password_hash)
        .fetch_optional(db)
        .await
    }

    /// Partial profile update; absent fields keep their current value.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        location: Option<&str>,
        phone: Option<&str>,
        land_area: Option<f64>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET name = COALESCE($2, name),
                 location = COALESCE($3, location),
                 phone = COALESCE($4, phone),
                 land_area = COALESCE($5, land_area)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(location)
        .bind(phone)
        .bind(land_area)
        .fetch_optional(db)
        .await
    }

    pub async fn set_avatar(db: &PgPool, id: Uuid, avatar_url: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET avatar_url = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(avatar_url)
        .fetch_optional(db)
        .await
    }

    pub async fn set_notifications(
        db: &PgPool,
        id: Uuid,
        notifications: bool,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET notifications = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(notifications)
        .fetch_optional(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{password, reset};
    use crate::error::ApiError;
    use time::Duration;

    async fn seed_user(db: &PgPool, email: &str, password_hash: &str) -> User {
        User::create(db, "Alice", email, password_hash)
            .await
            .expect("create user")
    }

    #[sqlx::test]
    async fn duplicate_email_hits_the_unique_constraint(pool: PgPool) {
        seed_user(&pool, "alice@example.com", "hash-a").await;
        let err = User::create(&pool, "Other", "alice@example.com", "hash-b")
            .await
            .expect_err("second insert must fail at the store");
        let code = err
            .as_database_error()
            .and_then(|d| d.code().map(|c| c.into_owned()));
        assert_eq!(code.as_deref(), Some("23505"));
        assert!(matches!(ApiError::from(err), ApiError::Conflict(_)));
    }

    #[sqlx::test]
    async fn reset_token_is_single_use(pool: PgPool) {
        let user = seed_user(&pool, "alice@example.com", "hash").await;
        let token = reset::generate(Duration::minutes(30));
        User::set_reset_token(&pool, user.id, &token.hash, token.expires_at)
            .await
            .expect("store token");

        let first = User::consume_reset_token(&pool, &token.hash, "new-hash")
            .await
            .expect("first consume");
        assert_eq!(first.map(|u| u.id), Some(user.id));

        // The conditional update already cleared the hash; a replay matches
        // zero rows.
        let second = User::consume_reset_token(&pool, &token.hash, "other-hash")
            .await
            .expect("second consume");
        assert!(second.is_none());
    }

    #[sqlx::test]
    async fn consume_clears_both_reset_fields(pool: PgPool) {
        let user = seed_user(&pool, "alice@example.com", "hash").await;
        let token = reset::generate(Duration::minutes(30));
        User::set_reset_token(&pool, user.id, &token.hash, token.expires_at)
            .await
            .expect("store token");

        let consumed = User::consume_reset_token(&pool, &token.hash, "new-hash")
            .await
            .expect("consume")
            .expect("token was valid");
        assert!(consumed.reset_token_hash.is_none());
        assert!(consumed.reset_token_expires_at.is_none());
        assert_eq!(consumed.password_hash, "new-hash");
    }

    #[sqlx::test]
    async fn expired_reset_token_is_not_consumable(pool: PgPool) {
        let user = seed_user(&pool, "alice@example.com", "hash").await;
        let token = reset::generate(Duration::minutes(30));
        let past = time::OffsetDateTime::now_utc() - Duration::minutes(31);
        User::set_reset_token(&pool, user.id, &token.hash, past)
            .await
            .expect("store token");

        let consumed = User::consume_reset_token(&pool, &token.hash, "new-hash")
            .await
            .expect("consume");
        assert!(consumed.is_none());

        // The expired row is still there until validation clears it lazily.
        let stale = User::find_by_reset_token_hash(&pool, &token.hash)
            .await
            .expect("lookup")
            .expect("row kept");
        User::clear_reset_token(&pool, stale.id).await.expect("clear");
        let gone = User::find_by_reset_token_hash(&pool, &token.hash)
            .await
            .expect("lookup");
        assert!(gone.is_none());
    }

    #[sqlx::test]
    async fn password_reset_swaps_the_credential(pool: PgPool) {
        let old_hash = password::hash_password("secret1").expect("hash old");
        let user = seed_user(&pool, "alice@example.com", &old_hash).await;

        let token = reset::generate(Duration::minutes(30));
        User::set_reset_token(&pool, user.id, &token.hash, token.expires_at)
            .await
            .expect("store token");

        let new_hash = password::hash_password("newpass1").expect("hash new");
        User::consume_reset_token(&pool, &token.hash, &new_hash)
            .await
            .expect("consume")
            .expect("token was valid");

        let reloaded = User::find_by_email(&pool, "alice@example.com")
            .await
            .expect("lookup")
            .expect("user exists");
        assert!(!password::verify_password("secret1", &reloaded.password_hash).unwrap());
        assert!(password::verify_password("newpass1", &reloaded.password_hash).unwrap());
    }
}
