//! Loan workflow endpoints.
//!
//! Readers act on `/books/{id}/...` for themselves. Administrators drive
//! approvals and pickups through `/admin/books/{id}/...`, naming the reader.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{LoanDetails, LoanQuery, QueueEntry},
};

use super::{books::PaginatedResponse, AuthenticatedUser};

/// Reader addressed by an admin workflow action
#[derive(Deserialize, ToSchema)]
pub struct AdminLoanAction {
    /// Reader holding (or requesting) the book
    pub user_id: i32,
}

/// Result of approving a return
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    /// `available` or `handed_over`
    pub status: String,
    /// Loan opened for the next reader in the queue
    pub next_loan: Option<LoanDetails>,
}

/// Wait queue position
#[derive(Serialize, ToSchema)]
pub struct QueuePosition {
    pub book_id: i32,
    /// 1-based position in the queue
    pub position: usize,
}

// =============================================================================
// READER ACTIONS
// =============================================================================

/// Request an available book
#[utoipa::path(
    post,
    path = "/books/{id}/loan",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Loan opened", body = LoanDetails),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book unavailable, already held or queued, or loan limit reached")
    )
)]
pub async fn request_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    let loan = state.services.loans.request_loan(book_id, claims.user_id).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Cancel own request before pickup
#[utoipa::path(
    delete,
    path = "/books/{id}/loan",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Request cancelled"),
        (status = 403, description = "No request on this book"),
        (status = 409, description = "Book already picked up")
    )
)]
pub async fn cancel_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.loans.cancel_request(book_id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Open loan of a book, if any
#[utoipa::path(
    get,
    path = "/books/{id}/loan",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Open loan, null when the book is available", body = LoanDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Option<LoanDetails>>> {
    let loan = state.services.loans.get_open_for_book(book_id).await?;
    // Readers only see who holds a book when it is themselves
    let loan = loan.map(|mut l| {
        if !claims.is_admin() && l.loan.user_id != claims.user_id {
            l.user = None;
        }
        l
    });
    Ok(Json(loan))
}

/// Announce a return of an active loan
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Return requested", body = LoanDetails),
        (status = 403, description = "Book not held by caller"),
        (status = 409, description = "Loan is not active")
    )
)]
pub async fn request_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.request_return(book_id, claims.user_id).await?;
    Ok(Json(loan))
}

/// Extend an active loan by one loan period
#[utoipa::path(
    post,
    path = "/books/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 403, description = "Book not held by caller"),
        (status = 409, description = "Readers waiting, renewals exhausted, or loan not active")
    )
)]
pub async fn renew_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.renew_loan(book_id, claims.user_id).await?;
    Ok(Json(loan))
}

/// Wait queue of a book
#[utoipa::path(
    get,
    path = "/books/{id}/queue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Queue in FIFO order", body = Vec<QueueEntry>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_book_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_admin()?;

    let queue = state.services.loans.get_book_queue(book_id).await?;
    Ok(Json(queue))
}

/// Wait for an unavailable book
#[utoipa::path(
    post,
    path = "/books/{id}/queue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Queued", body = QueuePosition),
        (status = 409, description = "Book available, already held or already queued")
    )
)]
pub async fn join_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<(StatusCode, Json<QueuePosition>)> {
    let position = state.services.loans.join_queue(book_id, claims.user_id).await?;
    Ok((StatusCode::CREATED, Json(QueuePosition { book_id, position })))
}

/// Stop waiting for a book
#[utoipa::path(
    delete,
    path = "/books/{id}/queue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Left the queue"),
        (status = 404, description = "Not queued for this book")
    )
)]
pub async fn leave_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.loans.leave_queue(book_id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ADMIN ACTIONS
// =============================================================================

/// Accept a pending loan request
#[utoipa::path(
    post,
    path = "/admin/books/{id}/approve-request",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = AdminLoanAction,
    responses(
        (status = 200, description = "Awaiting pickup", body = LoanDetails),
        (status = 409, description = "No requested loan for this reader")
    )
)]
pub async fn approve_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(action): Json<AdminLoanAction>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_admin()?;

    let loan = state.services.loans.approve_request(book_id, action.user_id).await?;
    Ok(Json(loan))
}

/// Record the hand-over of a book
#[utoipa::path(
    post,
    path = "/admin/books/{id}/pickup",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = AdminLoanAction,
    responses(
        (status = 200, description = "Loan active, due date set", body = LoanDetails),
        (status = 409, description = "No loan awaiting pickup for this reader")
    )
)]
pub async fn confirm_pickup(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(action): Json<AdminLoanAction>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_admin()?;

    let loan = state.services.loans.confirm_pickup(book_id, action.user_id).await?;
    Ok(Json(loan))
}

/// Finalize a return and pass the book on
#[utoipa::path(
    post,
    path = "/admin/books/{id}/approve-return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = AdminLoanAction,
    responses(
        (status = 200, description = "Loan closed", body = ReturnResponse),
        (status = 409, description = "No pending return for this reader")
    )
)]
pub async fn approve_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(action): Json<AdminLoanAction>,
) -> AppResult<Json<ReturnResponse>> {
    claims.require_admin()?;

    let next_loan = state.services.loans.approve_return(book_id, action.user_id).await?;
    let status = if next_loan.is_some() { "handed_over" } else { "available" };
    Ok(Json(ReturnResponse {
        status: status.to_string(),
        next_loan,
    }))
}

/// List loans for the admin dashboard
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans", body = PaginatedLoans),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    claims.require_admin()?;

    let (loans, total) = state.services.loans.list(&query).await?;
    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.per_page, 50)))
}

// =============================================================================
// PER USER
// =============================================================================

/// Open loans of a user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Open loans", body = Vec<LoanDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_self_or_admin(user_id)?;

    let loans = state.services.loans.get_user_loans(user_id).await?;
    Ok(Json(loans))
}

/// Closed loans of a user
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Loan history, most recent first", body = Vec<LoanDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_self_or_admin(user_id)?;

    let loans = state.services.loans.get_user_history(user_id).await?;
    Ok(Json(loans))
}

/// Queue positions of a user
#[utoipa::path(
    get,
    path = "/users/{id}/queue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Books the user waits for", body = Vec<QueueEntry>)
    )
)]
pub async fn get_user_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_self_or_admin(user_id)?;

    let entries = state.services.loans.get_user_queue_entries(user_id).await?;
    Ok(Json(entries))
}
