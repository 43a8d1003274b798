//! Users repository for database operations

use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres};

use super::paginate;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookShort,
        user::{Role, UpdateProfile, User, UserQuery, UserShort},
    },
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by national ID (login)
    pub async fn get_by_national_id(&self, national_id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE national_id = $1")
            .bind(national_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Check if national ID already exists
    pub async fn national_id_exists(&self, national_id: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE national_id = $1)")
                .bind(national_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Insert a new account. The table is locked for the duration of the
    /// transaction so only the very first account ever becomes administrator.
    pub async fn register(
        &self,
        national_id: &str,
        display_name: &str,
        password_hash: &str,
        email: Option<&str>,
    ) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let role = if existing == 0 { Role::Admin } else { Role::Reader };

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (national_id, display_name, password_hash, email, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(national_id)
        .bind(display_name)
        .bind(password_hash)
        .bind(email)
        .bind(role)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "National ID already registered"))?;

        tx.commit().await?;
        Ok(user)
    }

    /// Search users with pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page, 20);

        let mut conditions = vec!["1=1".to_string()];
        let mut params: Vec<String> = Vec::new();

        if let Some(ref name) = query.name {
            params.push(format!("%{}%", name.to_lowercase()));
            conditions.push(format!(
                "(LOWER(display_name) LIKE ${0} OR LOWER(national_id) LIKE ${0})",
                params.len()
            ));
        }

        if let Some(role) = query.role {
            params.push(role.as_str().to_string());
            conditions.push(format!("role = ${}", params.len()));
        }

        let where_clause = conditions.join(" AND ");

        let count_query = format!("SELECT COUNT(*) FROM users WHERE {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT id, display_name, role, avatar_url
            FROM users
            WHERE {}
            ORDER BY display_name, id
            LIMIT {} OFFSET {}
            "#,
            where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, UserShort>(&select_query);
        for param in &params {
            builder = builder.bind(param);
        }
        let users = builder.fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Update profile fields (password handled separately)
    pub async fn update_profile(&self, id: i32, data: &UpdateProfile) -> AppResult<User> {
        let now = Utc::now();
        let mut sets = vec!["updated_at = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.display_name, "display_name");
        add_field!(data.email, "email");
        add_field!(data.avatar_url, "avatar_url");
        add_field!(data.bio, "bio");

        let query = format!(
            "UPDATE users SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            idx
        );

        let mut builder = sqlx::query_as::<_, User>(&query).bind(now);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.display_name);
        bind_field!(data.email);
        bind_field!(data.avatar_url);
        bind_field!(data.bio);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn update_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_role(&self, id: i32, role: Role) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET role = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(role)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    // =========================================================================
    // FAVORITES
    // =========================================================================

    pub async fn list_favorites(&self, user_id: i32) -> AppResult<Vec<BookShort>> {
        let books = sqlx::query_as::<_, BookShort>(
            r#"
            SELECT b.id, b.title, b.author, b.genre, b.cover_url, b.available
            FROM favorites f
            JOIN books b ON b.id = f.book_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Add a favorite; adding twice is a no-op
    pub async fn add_favorite(&self, user_id: i32, book_id: i32) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO favorites (user_id, book_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, user_id: i32, book_id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Book {} is not in favorites",
                book_id
            )));
        }
        Ok(())
    }

    // =========================================================================
    // CIRCULATION (workflow transaction only)
    // =========================================================================

    /// Lock the user row, serializing loan requests of the same reader
    pub(crate) async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        Ok(())
    }

    pub(crate) async fn credit_read(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE users SET books_read = books_read + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
