//! Custom shelf model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::book::BookShort;

/// Shelf record with its book count
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Shelf {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub book_count: i64,
}

/// Shelf with its books
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShelfDetails {
    #[serde(flatten)]
    pub shelf: Shelf,
    pub books: Vec<BookShort>,
}

/// Create or rename shelf request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ShelfName {
    #[validate(length(min = 1, max = 80, message = "Shelf name must be 1-80 characters"))]
    pub name: String,
}

/// Add book to shelf request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ShelfBook {
    pub book_id: i32,
}
