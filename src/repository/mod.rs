//! Repository layer for database operations
//!
//! Methods that change book availability, the open loan or the wait queue take
//! a `&mut PgConnection` and are crate-private: they run inside the circulation
//! transaction opened by the loans service and nowhere else.

pub mod books;
pub mod loans;
pub mod notifications;
pub mod reviews;
pub mod shelves;
pub mod users;

use sqlx::{Pool, Postgres};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
    pub loans: loans::LoansRepository,
    pub reviews: reviews::ReviewsRepository,
    pub shelves: shelves::ShelvesRepository,
    pub notifications: notifications::NotificationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            reviews: reviews::ReviewsRepository::new(pool.clone()),
            shelves: shelves::ShelvesRepository::new(pool.clone()),
            notifications: notifications::NotificationsRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Normalize page/per_page query values into (page, per_page, offset)
pub(crate) fn paginate(page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 200);
    (page, per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::paginate;

    #[test]
    fn test_paginate_clamps_input() {
        assert_eq!(paginate(None, None, 20), (1, 20, 0));
        assert_eq!(paginate(Some(3), Some(10), 20), (3, 10, 20));
        assert_eq!(paginate(Some(0), Some(1000), 20), (1, 200, 0));
    }
}
