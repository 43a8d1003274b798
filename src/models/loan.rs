//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

use super::book::BookShort;
use super::user::UserShort;

/// Loan lifecycle states. Loans only ever move forward through this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    Requested,
    AwaitingPickup,
    Active,
    ReturnRequested,
    Closed,
}

impl LoanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Requested => "requested",
            LoanState::AwaitingPickup => "awaiting_pickup",
            LoanState::Active => "active",
            LoanState::ReturnRequested => "return_requested",
            LoanState::Closed => "closed",
        }
    }

    /// Whether the holder may still cancel without returning anything
    pub fn is_cancellable(&self) -> bool {
        matches!(self, LoanState::Requested | LoanState::AwaitingPickup)
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, LoanState::Closed)
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(LoanState::Requested),
            "awaiting_pickup" => Ok(LoanState::AwaitingPickup),
            "active" => Ok(LoanState::Active),
            "return_requested" => Ok(LoanState::ReturnRequested),
            "closed" => Ok(LoanState::Closed),
            _ => Err(format!("Invalid loan state: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for LoanState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: &str = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanState {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Why a loan was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Returned,
    Cancelled,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Returned => "returned",
            CloseReason::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "returned" => Ok(CloseReason::Returned),
            "cancelled" => Ok(CloseReason::Cancelled),
            _ => Err(format!("Invalid close reason: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for CloseReason {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for CloseReason {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: &str = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for CloseReason {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub state: LoanState,
    pub requested_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub nb_renews: i16,
    pub return_requested_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Loan {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == LoanState::Active && self.due_date.map(|d| d < now).unwrap_or(false)
    }
}

/// Loan with book and borrower for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub book: BookShort,
    pub user: Option<UserShort>,
    pub is_overdue: bool,
}

/// Filter for loan listings
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    /// Only loans in this state
    pub state: Option<LoanState>,
    /// Only loans of this user
    pub user_id: Option<i32>,
    /// Only active loans past their due date
    pub overdue: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A reader's place in a book's wait queue
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct QueueEntry {
    pub book_id: i32,
    pub user_id: i32,
    /// 1-based position in the queue
    pub position: i64,
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_state_text_form() {
        for state in [
            LoanState::Requested,
            LoanState::AwaitingPickup,
            LoanState::Active,
            LoanState::ReturnRequested,
            LoanState::Closed,
        ] {
            assert_eq!(state.as_str().parse::<LoanState>(), Ok(state));
        }
        assert!("returned".parse::<LoanState>().is_err());
    }

    #[test]
    fn test_loan_state_serde_matches_db_text() {
        let json = serde_json::to_string(&LoanState::ReturnRequested).unwrap();
        assert_eq!(json, "\"return_requested\"");
    }

    #[test]
    fn test_only_unpicked_loans_are_cancellable() {
        assert!(LoanState::Requested.is_cancellable());
        assert!(LoanState::AwaitingPickup.is_cancellable());
        assert!(!LoanState::Active.is_cancellable());
        assert!(!LoanState::ReturnRequested.is_cancellable());
    }

    #[test]
    fn test_overdue_only_for_active_loans() {
        let now = Utc::now();
        let mut loan = Loan {
            id: 1,
            book_id: 1,
            user_id: 1,
            state: LoanState::Active,
            requested_at: now - chrono::Duration::days(10),
            picked_up_at: Some(now - chrono::Duration::days(9)),
            due_date: Some(now - chrono::Duration::days(2)),
            nb_renews: 0,
            return_requested_at: None,
            closed_at: None,
            close_reason: None,
        };
        assert!(loan.is_overdue(now));

        loan.state = LoanState::ReturnRequested;
        assert!(!loan.is_overdue(now));
    }
}
