//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgConnection, Pool, Postgres, Row};

use super::paginate;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookShort,
        loan::{CloseReason, Loan, LoanDetails, LoanQuery, LoanState, QueueEntry},
        user::UserShort,
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT l.*,
           b.title AS book_title, b.author AS book_author, b.genre AS book_genre,
           b.cover_url AS book_cover_url, b.available AS book_available,
           u.display_name AS user_display_name, u.role AS user_role,
           u.avatar_url AS user_avatar_url
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

fn details_from_row(row: &PgRow, now: DateTime<Utc>) -> AppResult<LoanDetails> {
    let loan = Loan::from_row(row)?;
    let is_overdue = loan.is_overdue(now);

    Ok(LoanDetails {
        book: BookShort {
            id: loan.book_id,
            title: row.get("book_title"),
            author: row.get("book_author"),
            genre: row.get("book_genre"),
            cover_url: row.get("book_cover_url"),
            available: row.get("book_available"),
        },
        user: Some(UserShort {
            id: loan.user_id,
            display_name: row.get("user_display_name"),
            role: row.get("user_role"),
            avatar_url: row.get("user_avatar_url"),
        }),
        is_overdue,
        loan,
    })
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get the open loan of a book with details, if any
    pub async fn get_open_for_book(&self, book_id: i32) -> AppResult<Option<LoanDetails>> {
        let query = format!("{} WHERE l.book_id = $1 AND l.state <> 'closed'", DETAILS_SELECT);
        let row = sqlx::query(&query)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| details_from_row(&r, Utc::now())).transpose()
    }

    /// List loans with filters and pagination
    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page, 50);

        let mut conditions = vec!["1=1".to_string()];
        let mut idx = 1;

        if query.state.is_some() {
            conditions.push(format!("l.state = ${}", idx));
            idx += 1;
        }
        if query.user_id.is_some() {
            conditions.push(format!("l.user_id = ${}", idx));
        }
        if query.overdue == Some(true) {
            conditions.push("l.state = 'active' AND l.due_date < NOW()".to_string());
        }

        let where_clause = conditions.join(" AND ");

        let count_query = format!("SELECT COUNT(*) FROM loans l WHERE {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(state) = query.state {
            count_builder = count_builder.bind(state);
        }
        if let Some(user_id) = query.user_id {
            count_builder = count_builder.bind(user_id);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "{} WHERE {} ORDER BY l.requested_at DESC, l.id DESC LIMIT {} OFFSET {}",
            DETAILS_SELECT, where_clause, per_page, offset
        );
        let mut builder = sqlx::query(&select_query);
        if let Some(state) = query.state {
            builder = builder.bind(state);
        }
        if let Some(user_id) = query.user_id {
            builder = builder.bind(user_id);
        }
        let rows = builder.fetch_all(&self.pool).await?;

        let now = Utc::now();
        let loans = rows
            .iter()
            .map(|row| details_from_row(row, now))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((loans, total))
    }

    /// Open loans of a user, oldest first
    pub async fn get_user_open_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.user_id = $1 AND l.state <> 'closed' ORDER BY l.requested_at",
            DETAILS_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        rows.iter().map(|row| details_from_row(row, now)).collect()
    }

    /// Closed loans of a user, most recent first
    pub async fn get_user_history(&self, user_id: i32, limit: i64) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.user_id = $1 AND l.state = 'closed' ORDER BY l.closed_at DESC LIMIT $2",
            DETAILS_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        rows.iter().map(|row| details_from_row(row, now)).collect()
    }

    /// Wait queue positions of a user across all books
    pub async fn get_user_queue_entries(&self, user_id: i32) -> AppResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT book_id, user_id, position, queued_at
            FROM (
                SELECT book_id, user_id, queued_at,
                       ROW_NUMBER() OVER (PARTITION BY book_id ORDER BY id) AS position
                FROM book_queue
            ) q
            WHERE q.user_id = $1
            ORDER BY queued_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    // =========================================================================
    // CIRCULATION (workflow transaction only)
    // =========================================================================

    /// Number of open loans of a user
    pub(crate) async fn count_open_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE user_id = $1 AND state <> 'closed'",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    pub(crate) async fn open(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        user_id: i32,
        state: LoanState,
        now: DateTime<Utc>,
    ) -> AppResult<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO loans (book_id, user_id, state, requested_at, nb_renews)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING id
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(state)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Move the open loan of a book to `state`, stamping the matching timestamp
    pub(crate) async fn advance(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        state: LoanState,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = match state {
            LoanState::Active | LoanState::ReturnRequested => {
                let column = if state == LoanState::Active {
                    "picked_up_at"
                } else {
                    "return_requested_at"
                };
                let query = format!(
                    "UPDATE loans SET state = $1, due_date = $2, {} = $3 WHERE book_id = $4 AND state <> 'closed'",
                    column
                );
                sqlx::query(&query)
                    .bind(state)
                    .bind(due_date)
                    .bind(now)
                    .bind(book_id)
                    .execute(&mut *conn)
                    .await?
            }
            _ => {
                sqlx::query(
                    "UPDATE loans SET state = $1, due_date = $2 WHERE book_id = $3 AND state <> 'closed'",
                )
                .bind(state)
                .bind(due_date)
                .bind(book_id)
                .execute(&mut *conn)
                .await?
            }
        };

        if result.rows_affected() != 1 {
            return Err(AppError::Internal(format!(
                "Expected one open loan for book {}, updated {}",
                book_id,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    pub(crate) async fn renew(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        due_date: DateTime<Utc>,
        nb_renews: i16,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE loans SET due_date = $1, nb_renews = $2 WHERE book_id = $3 AND state = 'active'",
        )
        .bind(due_date)
        .bind(nb_renews)
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub(crate) async fn close(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE loans SET state = 'closed', closed_at = $1, close_reason = $2
            WHERE book_id = $3 AND state <> 'closed'
            "#,
        )
        .bind(now)
        .bind(reason)
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
