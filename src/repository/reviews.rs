//! Reviews repository

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::review::{RatingSummary, Review, ReviewWithAuthor, UpsertReview},
};

#[derive(Clone)]
pub struct ReviewsRepository {
    pool: Pool<Postgres>,
}

impl ReviewsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Review> {
        sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }

    /// Reviews of a book, newest first
    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<ReviewWithAuthor>> {
        let reviews = sqlx::query_as::<_, ReviewWithAuthor>(
            r#"
            SELECT r.id, r.user_id, u.display_name, u.avatar_url,
                   r.rating, r.body, r.created_at, r.updated_at
            FROM reviews r
            JOIN users u ON u.id = r.user_id
            WHERE r.book_id = $1
            ORDER BY COALESCE(r.updated_at, r.created_at) DESC
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    /// Create the user's review of a book, or replace the existing one
    pub async fn upsert(&self, user_id: i32, book_id: i32, data: &UpsertReview) -> AppResult<Review> {
        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (user_id, book_id, rating, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, book_id)
            DO UPDATE SET rating = EXCLUDED.rating, body = EXCLUDED.body, updated_at = $5
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(data.rating)
        .bind(&data.body)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(review)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn summary(&self, book_id: i32) -> AppResult<RatingSummary> {
        let summary = sqlx::query_as::<_, RatingSummary>(
            "SELECT AVG(rating)::float8 AS average, COUNT(*) AS count FROM reviews WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }
}
