//! Circulation workflow core.
//!
//! Every decision about a book's availability, its open loan and its wait queue
//! is taken here, on an in-memory [`BookLedger`] loaded under a row lock. Each
//! operation validates all of its preconditions before touching the ledger and
//! returns the [`Effect`]s it applied, which the loans repository persists in
//! the same transaction.

mod ledger;

pub use ledger::{BookLedger, Holding};

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::LoansConfig,
    models::loan::{CloseReason, LoanState},
};

/// Loan rules applied by the ledger
#[derive(Debug, Clone)]
pub struct LoanPolicy {
    pub loan_period: Duration,
    /// 0 disables the limit
    pub max_active_loans: u32,
    pub max_renewals: i16,
    pub require_approval: bool,
}

impl LoanPolicy {
    /// State a freshly requested loan starts in
    pub fn initial_state(&self) -> LoanState {
        if self.require_approval {
            LoanState::Requested
        } else {
            LoanState::AwaitingPickup
        }
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self::from(&LoansConfig::default())
    }
}

impl From<&LoansConfig> for LoanPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            loan_period: Duration::days(config.loan_period_days),
            max_active_loans: config.max_active_loans,
            max_renewals: config.max_renewals,
            require_approval: config.require_approval,
        }
    }
}

/// A single change applied to a book ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A new open loan row for `user_id`
    LoanOpened { user_id: i32, state: LoanState },
    /// The open loan moved forward to `state`
    LoanAdvanced {
        user_id: i32,
        state: LoanState,
        due_date: Option<DateTime<Utc>>,
    },
    LoanRenewed {
        user_id: i32,
        due_date: DateTime<Utc>,
        nb_renews: i16,
    },
    LoanClosed { user_id: i32, reason: CloseReason },
    Enqueued { user_id: i32 },
    Dequeued { user_id: i32 },
    AvailabilityChanged { available: bool },
    /// The user completed a loan
    ReadCredited { user_id: i32 },
    /// The book is now waiting for `user_id` to pick it up
    AvailabilityNotice { user_id: i32 },
}
