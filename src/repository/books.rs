//! Books repository for database operations

use chrono::Utc;
use sqlx::{FromRow, PgConnection, Pool, Postgres, Row};

use super::paginate;
use crate::{
    circulation::{BookLedger, Holding},
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookQuery, BookShort, CreateBook, UpdateBook},
        loan::QueueEntry,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book with queue length, current due date and rating summary
    pub async fn get_details(&self, id: i32) -> AppResult<BookDetails> {
        let row = sqlx::query(
            r#"
            SELECT b.*,
                   (SELECT COUNT(*) FROM book_queue q WHERE q.book_id = b.id) AS queue_length,
                   (SELECT l.due_date FROM loans l
                     WHERE l.book_id = b.id AND l.state <> 'closed') AS current_due_date,
                   (SELECT AVG(r.rating)::float8 FROM reviews r WHERE r.book_id = b.id) AS average_rating,
                   (SELECT COUNT(*) FROM reviews r WHERE r.book_id = b.id) AS review_count
            FROM books b
            WHERE b.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        Ok(BookDetails {
            book: Book::from_row(&row)?,
            queue_length: row.get("queue_length"),
            due_date: row.get("current_due_date"),
            average_rating: row.get("average_rating"),
            review_count: row.get("review_count"),
        })
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<BookShort>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page, 20);

        let mut conditions = vec!["1=1".to_string()];
        let mut params: Vec<String> = Vec::new();

        if let Some(ref title) = query.title {
            params.push(format!("%{}%", title.to_lowercase()));
            conditions.push(format!("LOWER(title) LIKE ${}", params.len()));
        }

        if let Some(ref author) = query.author {
            params.push(format!("%{}%", author.to_lowercase()));
            conditions.push(format!("LOWER(author) LIKE ${}", params.len()));
        }

        if let Some(ref genre) = query.genre {
            params.push(genre.to_lowercase());
            conditions.push(format!("LOWER(genre) = ${}", params.len()));
        }

        if let Some(ref q) = query.q {
            params.push(format!("%{}%", q.to_lowercase()));
            let idx = params.len();
            conditions.push(format!(
                "(LOWER(title) LIKE ${idx} OR LOWER(author) LIKE ${idx} OR LOWER(COALESCE(description, '')) LIKE ${idx})"
            ));
        }

        if let Some(available) = query.available {
            conditions.push(format!("available = {}", available));
        }

        let where_clause = conditions.join(" AND ");

        let count_query = format!("SELECT COUNT(*) FROM books WHERE {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT id, title, author, genre, cover_url, available
            FROM books
            WHERE {}
            ORDER BY title, id
            LIMIT {} OFFSET {}
            "#,
            where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, BookShort>(&select_query);
        for param in &params {
            builder = builder.bind(param);
        }
        let books = builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Distinct genres present in the catalog
    pub async fn genres(&self) -> AppResult<Vec<String>> {
        let genres = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT genre FROM books WHERE genre IS NOT NULL ORDER BY genre",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(genres)
    }

    /// Wait queue of a book in FIFO order
    pub async fn queue(&self, book_id: i32) -> AppResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT book_id, user_id,
                   ROW_NUMBER() OVER (ORDER BY id) AS position,
                   queued_at
            FROM book_queue
            WHERE book_id = $1
            ORDER BY id
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    // =========================================================================
    // WRITE (metadata)
    // =========================================================================

    /// Create a book; new books are available
    pub async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, genre, description, cover_url, publication_year)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.author)
        .bind(&data.isbn)
        .bind(&data.genre)
        .bind(&data.description)
        .bind(&data.cover_url)
        .bind(data.publication_year)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    /// Update book metadata. Availability is not writable here.
    pub async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
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

        add_field!(data.title, "title");
        add_field!(data.author, "author");
        add_field!(data.isbn, "isbn");
        add_field!(data.genre, "genre");
        add_field!(data.description, "description");
        add_field!(data.cover_url, "cover_url");
        add_field!(data.publication_year, "publication_year");

        let query = format!(
            "UPDATE books SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            idx
        );

        let mut builder = sqlx::query_as::<_, Book>(&query).bind(now);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.title);
        bind_field!(data.author);
        bind_field!(data.isbn);
        bind_field!(data.genre);
        bind_field!(data.description);
        bind_field!(data.cover_url);
        bind_field!(data.publication_year);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book that has no open loan and nobody waiting
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let (ledger, _) = self.lock_ledger(&mut *tx, id).await?;
        if !ledger.is_available() || ledger.queue_len() > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} is on loan or reserved and cannot be deleted",
                id
            )));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // CIRCULATION (workflow transaction only)
    // =========================================================================

    /// Lock the book row and load its ledger and title
    pub(crate) async fn lock_ledger(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<(BookLedger, String)> {
        let title: String = sqlx::query_scalar("SELECT title FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let holding = sqlx::query(
            "SELECT user_id, state, due_date, nb_renews FROM loans WHERE book_id = $1 AND state <> 'closed'",
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| Holding {
            user_id: row.get("user_id"),
            state: row.get("state"),
            due_date: row.get("due_date"),
            nb_renews: row.get("nb_renews"),
        });

        let queue: Vec<i32> =
            sqlx::query_scalar("SELECT user_id FROM book_queue WHERE book_id = $1 ORDER BY id")
                .bind(book_id)
                .fetch_all(&mut *conn)
                .await?;

        Ok((BookLedger::new(book_id, holding, queue), title))
    }

    pub(crate) async fn set_availability(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        available: bool,
    ) -> AppResult<()> {
        sqlx::query("UPDATE books SET available = $1 WHERE id = $2")
            .bind(available)
            .bind(book_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn enqueue(&self, conn: &mut PgConnection, book_id: i32, user_id: i32) -> AppResult<()> {
        sqlx::query("INSERT INTO book_queue (book_id, user_id) VALUES ($1, $2)")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn dequeue(&self, conn: &mut PgConnection, book_id: i32, user_id: i32) -> AppResult<()> {
        sqlx::query("DELETE FROM book_queue WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
