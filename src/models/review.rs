//! Book review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Review record. A user holds at most one review per book.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Review {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    /// Rating from 1 to 5
    pub rating: i16,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Review with the author's display name, for book pages
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ReviewWithAuthor {
    pub id: i32,
    pub user_id: i32,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub rating: i16,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create or replace own review
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 5000, message = "Review is limited to 5000 characters"))]
    #[serde(default)]
    pub body: String,
}

/// Aggregated ratings for a book
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let ok = UpsertReview { rating: 5, body: "Loved it".into() };
        assert!(ok.validate().is_ok());

        let zero = UpsertReview { rating: 0, body: String::new() };
        assert!(zero.validate().is_err());

        let six = UpsertReview { rating: 6, body: String::new() };
        assert!(six.validate().is_err());
    }
}
