//! Book review endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::review::{RatingSummary, Review, ReviewWithAuthor, UpsertReview},
};

use super::AuthenticatedUser;

/// Reviews of a book
#[utoipa::path(
    get,
    path = "/books/{id}/reviews",
    tag = "reviews",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Reviews, newest first", body = Vec<ReviewWithAuthor>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn list_reviews(
    State(state): State<crate::AppState>,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<ReviewWithAuthor>>> {
    let reviews = state.services.reviews.list_for_book(book_id).await?;
    Ok(Json(reviews))
}

/// Average rating of a book
#[utoipa::path(
    get,
    path = "/books/{id}/rating",
    tag = "reviews",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Rating summary", body = RatingSummary),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_rating(
    State(state): State<crate::AppState>,
    Path(book_id): Path<i32>,
) -> AppResult<Json<RatingSummary>> {
    let summary = state.services.reviews.summary(book_id).await?;
    Ok(Json(summary))
}

/// Write or replace own review of a book
#[utoipa::path(
    put,
    path = "/books/{id}/reviews",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpsertReview,
    responses(
        (status = 200, description = "Review saved", body = Review),
        (status = 400, description = "Rating out of range"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn upsert_review(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(data): Json<UpsertReview>,
) -> AppResult<Json<Review>> {
    data.validate()?;

    let review = state.services.reviews.upsert(claims.user_id, book_id, data).await?;
    Ok(Json(review))
}

/// Delete a review
#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn delete_review(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.reviews.delete(id, &claims).await?;
    Ok(StatusCode::NO_CONTENT)
}
