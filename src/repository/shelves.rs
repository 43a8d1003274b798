//! Custom shelves repository

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{book::BookShort, shelf::Shelf},
};

const SHELF_SELECT: &str = r#"
    SELECT s.id, s.user_id, s.name, s.created_at,
           (SELECT COUNT(*) FROM shelf_books sb WHERE sb.shelf_id = s.id) AS book_count
    FROM shelves s
"#;

#[derive(Clone)]
pub struct ShelvesRepository {
    pool: Pool<Postgres>,
}

impl ShelvesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<Shelf>> {
        let query = format!("{} WHERE s.user_id = $1 ORDER BY s.name", SHELF_SELECT);
        let shelves = sqlx::query_as::<_, Shelf>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(shelves)
    }

    pub async fn get(&self, id: i32) -> AppResult<Shelf> {
        let query = format!("{} WHERE s.id = $1", SHELF_SELECT);
        sqlx::query_as::<_, Shelf>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Shelf with id {} not found", id)))
    }

    async fn ensure_name_free(&self, user_id: i32, name: &str, except: Option<i32>) -> AppResult<()> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM shelves
                WHERE user_id = $1 AND name = $2 AND ($3::int IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        if taken {
            return Err(AppError::Conflict(format!("Shelf '{}' already exists", name)));
        }
        Ok(())
    }

    pub async fn create(&self, user_id: i32, name: &str) -> AppResult<Shelf> {
        self.ensure_name_free(user_id, name, None).await?;

        let id: i32 = sqlx::query_scalar("INSERT INTO shelves (user_id, name) VALUES ($1, $2) RETURNING id")
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::conflict_on_unique(e, &format!("Shelf '{}' already exists", name)))?;
        self.get(id).await
    }

    pub async fn rename(&self, id: i32, user_id: i32, name: &str) -> AppResult<Shelf> {
        self.ensure_name_free(user_id, name, Some(id)).await?;

        sqlx::query("UPDATE shelves SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::conflict_on_unique(e, &format!("Shelf '{}' already exists", name)))?;
        self.get(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM shelves WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Shelf with id {} not found", id)));
        }
        Ok(())
    }

    /// Books on a shelf, most recently added first
    pub async fn books(&self, shelf_id: i32) -> AppResult<Vec<BookShort>> {
        let books = sqlx::query_as::<_, BookShort>(
            r#"
            SELECT b.id, b.title, b.author, b.genre, b.cover_url, b.available
            FROM shelf_books sb
            JOIN books b ON b.id = sb.book_id
            WHERE sb.shelf_id = $1
            ORDER BY sb.added_at DESC
            "#,
        )
        .bind(shelf_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Put a book on a shelf; adding twice is a no-op
    pub async fn add_book(&self, shelf_id: i32, book_id: i32) -> AppResult<()> {
        sqlx::query("INSERT INTO shelf_books (shelf_id, book_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(shelf_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_book(&self, shelf_id: i32, book_id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM shelf_books WHERE shelf_id = $1 AND book_id = $2")
            .bind(shelf_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Book {} is not on shelf {}",
                book_id, shelf_id
            )));
        }
        Ok(())
    }
}
