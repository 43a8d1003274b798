//! Reviews service

use crate::{
    error::{AppError, AppResult},
    models::{
        review::{RatingSummary, Review, ReviewWithAuthor, UpsertReview},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReviewsService {
    repository: Repository,
}

impl ReviewsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<ReviewWithAuthor>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reviews.list_for_book(book_id).await
    }

    pub async fn summary(&self, book_id: i32) -> AppResult<RatingSummary> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reviews.summary(book_id).await
    }

    /// Write the user's review of a book, replacing any previous one
    pub async fn upsert(&self, user_id: i32, book_id: i32, data: UpsertReview) -> AppResult<Review> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reviews.upsert(user_id, book_id, &data).await
    }

    /// Authors delete their own reviews, admins any review
    pub async fn delete(&self, id: i32, claims: &UserClaims) -> AppResult<()> {
        let review = self.repository.reviews.get_by_id(id).await?;
        if review.user_id != claims.user_id && !claims.is_admin() {
            return Err(AppError::Authorization(
                "Cannot delete another user's review".to_string(),
            ));
        }
        self.repository.reviews.delete(id).await
    }
}
