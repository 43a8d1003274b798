//! Statistics endpoints

use axum::{extract::Query, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppResult;

use super::AuthenticatedUser;

/// Statistics response
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    /// User statistics
    pub users: UserStats,
    /// Book statistics
    pub books: BookStats,
    /// Loan statistics
    pub loans: LoanStats,
    /// Books with the most completed loans
    pub most_borrowed: Vec<BorrowedBook>,
}

#[derive(Serialize, ToSchema)]
pub struct UserStats {
    /// Total number of users
    pub total: i64,
    /// Administrators
    pub admins: i64,
    /// Users with at least one open loan
    pub borrowers: i64,
}

#[derive(Serialize, ToSchema)]
pub struct BookStats {
    pub total: i64,
    pub available: i64,
    /// Books with at least one reader waiting
    pub reserved: i64,
}

#[derive(Serialize, ToSchema)]
pub struct LoanStats {
    /// Open loans by state
    pub by_state: Vec<StatEntry>,
    /// Active loans past their due date
    pub overdue: i64,
    /// Books returned today
    pub returned_today: i64,
    /// Wait queue entries across all books
    pub queued: i64,
}

#[derive(Serialize, ToSchema)]
pub struct StatEntry {
    /// Label
    pub label: String,
    /// Value
    pub value: i64,
}

#[derive(Serialize, FromRow, ToSchema)]
pub struct BorrowedBook {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    /// Completed loans
    pub loans: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct StatsQuery {
    /// Size of the most borrowed ranking (default 10, max 100)
    pub top: Option<i64>,
}

/// Dashboard statistics
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    params(StatsQuery),
    responses(
        (status = 200, description = "Library statistics", body = StatsResponse),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<StatsResponse>> {
    claims.require_admin()?;

    let stats = state.services.stats.get_stats(query.top).await?;
    Ok(Json(stats))
}
