//! Statistics service for the admin dashboard

use sqlx::Row;

use crate::{
    api::stats::{BookStats, BorrowedBook, LoanStats, StatEntry, StatsResponse, UserStats},
    error::AppResult,
    repository::Repository,
};

/// Books listed in the most borrowed ranking by default
const DEFAULT_TOP: i64 = 10;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Round-trip to the database
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.repository.pool).await?;
        Ok(())
    }

    /// Dashboard counters and the most borrowed books
    pub async fn get_stats(&self, top: Option<i64>) -> AppResult<StatsResponse> {
        let pool = &self.repository.pool;

        // Users
        let user_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE role = 'admin') AS admins,
                   (SELECT COUNT(DISTINCT user_id) FROM loans WHERE state <> 'closed') AS borrowers
            FROM users
            "#,
        )
        .fetch_one(pool)
        .await?;

        // Books
        let book_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE available) AS available,
                   (SELECT COUNT(DISTINCT book_id) FROM book_queue) AS reserved
            FROM books
            "#,
        )
        .fetch_one(pool)
        .await?;

        // Loans
        let by_state: Vec<StatEntry> = sqlx::query(
            r#"
            SELECT state AS label, COUNT(*) AS value
            FROM loans
            WHERE state <> 'closed'
            GROUP BY state
            ORDER BY value DESC
            "#,
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| StatEntry {
            label: row.get("label"),
            value: row.get("value"),
        })
        .collect();

        let loan_row = sqlx::query(
            r#"
            SELECT COUNT(*) FILTER (WHERE state = 'active' AND due_date < NOW()) AS overdue,
                   COUNT(*) FILTER (WHERE state = 'closed' AND close_reason = 'returned'
                                    AND closed_at >= date_trunc('day', NOW())) AS returned_today,
                   (SELECT COUNT(*) FROM book_queue) AS queued
            FROM loans
            "#,
        )
        .fetch_one(pool)
        .await?;

        let most_borrowed = sqlx::query_as::<_, BorrowedBook>(
            r#"
            SELECT b.id AS book_id, b.title, b.author, COUNT(l.id) AS loans
            FROM loans l
            JOIN books b ON b.id = l.book_id
            WHERE l.state = 'closed' AND l.close_reason = 'returned'
            GROUP BY b.id, b.title, b.author
            ORDER BY loans DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(top.unwrap_or(DEFAULT_TOP).clamp(1, 100))
        .fetch_all(pool)
        .await?;

        Ok(StatsResponse {
            users: UserStats {
                total: user_row.get("total"),
                admins: user_row.get("admins"),
                borrowers: user_row.get("borrowers"),
            },
            books: BookStats {
                total: book_row.get("total"),
                available: book_row.get("available"),
                reserved: book_row.get("reserved"),
            },
            loans: LoanStats {
                by_state,
                overdue: loan_row.get("overdue"),
                returned_today: loan_row.get("returned_today"),
                queued: loan_row.get("queued"),
            },
            most_borrowed,
        })
    }
}
