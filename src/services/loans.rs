//! Loan workflow service.
//!
//! Each workflow operation runs in one database transaction:
//! lock the book row and load its [`BookLedger`], apply the ledger operation,
//! persist the resulting effects, commit, and only then hand notices to the
//! hub in the background.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, Transaction};

use crate::{
    circulation::{BookLedger, Effect, LoanPolicy},
    error::{AppError, AppResult},
    models::{
        loan::{LoanDetails, LoanQuery, QueueEntry},
        notification::{AvailabilityNotice, Notification, KIND_BOOK_AVAILABLE},
    },
    repository::Repository,
    services::notifications::NotificationHub,
};

/// Closed loans returned by the history endpoint
const HISTORY_LIMIT: i64 = 100;

/// A locked book ledger inside its open transaction
struct Locked {
    tx: Transaction<'static, Postgres>,
    ledger: BookLedger,
    title: String,
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: LoanPolicy,
    hub: NotificationHub,
}

impl LoansService {
    pub fn new(repository: Repository, policy: LoanPolicy, hub: NotificationHub) -> Self {
        Self { repository, policy, hub }
    }

    // =========================================================================
    // WORKFLOW
    // =========================================================================

    /// Reader requests an available book
    pub async fn request_loan(&self, book_id: i32, user_id: i32) -> AppResult<LoanDetails> {
        let mut locked = self.begin(book_id).await?;

        self.repository.users.lock(&mut *locked.tx, user_id).await?;
        let open_loans = self
            .repository
            .loans
            .count_open_for_user(&mut *locked.tx, user_id)
            .await?;

        let effects = locked
            .ledger
            .request_loan(user_id, open_loans.max(0) as u32, &self.policy)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Loan requested");
        self.open_loan(book_id).await
    }

    /// Admin accepts a pending request
    pub async fn approve_request(&self, book_id: i32, user_id: i32) -> AppResult<LoanDetails> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.approve_request(user_id)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Loan request approved");
        self.open_loan(book_id).await
    }

    /// Admin hands the book over to the reader
    pub async fn confirm_pickup(&self, book_id: i32, user_id: i32) -> AppResult<LoanDetails> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.confirm_pickup(user_id, Utc::now(), &self.policy)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Pickup confirmed");
        self.open_loan(book_id).await
    }

    /// Reader announces they are bringing the book back
    pub async fn request_return(&self, book_id: i32, user_id: i32) -> AppResult<LoanDetails> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.request_return(user_id)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Return requested");
        self.open_loan(book_id).await
    }

    /// Admin validates a return. Returns the loan of the next reader, if any.
    pub async fn approve_return(&self, book_id: i32, user_id: i32) -> AppResult<Option<LoanDetails>> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.approve_return(user_id)?;
        let next = locked.ledger.holding().map(|h| h.user_id);
        self.finish(locked, effects, user_id).await?;

        match next {
            Some(next_user) => tracing::info!(book_id, user_id, next_user, "Return approved, book handed to queue"),
            None => tracing::info!(book_id, user_id, "Return approved, book available"),
        }
        self.repository.loans.get_open_for_book(book_id).await
    }

    /// Reader withdraws a request not yet picked up
    pub async fn cancel_request(&self, book_id: i32, user_id: i32) -> AppResult<()> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.cancel_request(user_id)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Loan request cancelled");
        Ok(())
    }

    /// Holder extends an active loan
    pub async fn renew_loan(&self, book_id: i32, user_id: i32) -> AppResult<LoanDetails> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.renew(user_id, Utc::now(), &self.policy)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Loan renewed");
        self.open_loan(book_id).await
    }

    /// Reader waits for an unavailable book. Returns their 1-based position.
    pub async fn join_queue(&self, book_id: i32, user_id: i32) -> AppResult<usize> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.join_queue(user_id)?;
        let position = locked.ledger.queue_len();
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, position, "Joined wait queue");
        Ok(position)
    }

    pub async fn leave_queue(&self, book_id: i32, user_id: i32) -> AppResult<()> {
        let mut locked = self.begin(book_id).await?;
        let effects = locked.ledger.leave_queue(user_id)?;
        self.finish(locked, effects, user_id).await?;

        tracing::info!(book_id, user_id, "Left wait queue");
        Ok(())
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.loans.list(query).await
    }

    pub async fn get_open_for_book(&self, book_id: i32) -> AppResult<Option<LoanDetails>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.loans.get_open_for_book(book_id).await
    }

    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.loans.get_user_open_loans(user_id).await
    }

    pub async fn get_user_history(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.loans.get_user_history(user_id, HISTORY_LIMIT).await
    }

    pub async fn get_user_queue_entries(&self, user_id: i32) -> AppResult<Vec<QueueEntry>> {
        self.repository.loans.get_user_queue_entries(user_id).await
    }

    pub async fn get_book_queue(&self, book_id: i32) -> AppResult<Vec<QueueEntry>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.books.queue(book_id).await
    }

    // =========================================================================
    // TRANSACTION PLUMBING
    // =========================================================================

    /// Open loan of a book right after a transition that leaves one
    async fn open_loan(&self, book_id: i32) -> AppResult<LoanDetails> {
        self.repository
            .loans
            .get_open_for_book(book_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Book {} has no open loan", book_id)))
    }

    async fn begin(&self, book_id: i32) -> AppResult<Locked> {
        let mut tx = self.repository.pool.begin().await?;
        let (ledger, title) = self.repository.books.lock_ledger(&mut *tx, book_id).await?;
        Ok(Locked { tx, ledger, title })
    }

    /// Persist effects, commit, then queue notices for delivery
    async fn finish(&self, locked: Locked, effects: Vec<Effect>, actor: i32) -> AppResult<()> {
        let Locked { mut tx, ledger, title } = locked;
        let book_id = ledger.book_id();
        let now = Utc::now();

        let notices = self
            .apply_effects(&mut *tx, book_id, &title, &effects, now)
            .await?;
        tx.commit().await?;

        tracing::debug!(book_id, actor, effects = effects.len(), "Circulation effects committed");

        if !notices.is_empty() {
            self.hub.spawn_dispatch(notices);
        }
        Ok(())
    }

    async fn apply_effects(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        title: &str,
        effects: &[Effect],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<(Notification, AvailabilityNotice)>> {
        let repo = &self.repository;
        let mut notices = Vec::new();

        for effect in effects {
            match *effect {
                Effect::LoanOpened { user_id, state } => {
                    repo.loans.open(conn, book_id, user_id, state, now).await?;
                }
                Effect::LoanAdvanced { state, due_date, .. } => {
                    repo.loans.advance(conn, book_id, state, due_date, now).await?;
                }
                Effect::LoanRenewed { due_date, nb_renews, .. } => {
                    repo.loans.renew(conn, book_id, due_date, nb_renews).await?;
                }
                Effect::LoanClosed { reason, .. } => {
                    repo.loans.close(conn, book_id, reason, now).await?;
                }
                Effect::Enqueued { user_id } => {
                    repo.books.enqueue(conn, book_id, user_id).await?;
                }
                Effect::Dequeued { user_id } => {
                    repo.books.dequeue(conn, book_id, user_id).await?;
                }
                Effect::AvailabilityChanged { available } => {
                    repo.books.set_availability(conn, book_id, available).await?;
                }
                Effect::ReadCredited { user_id } => {
                    repo.users.credit_read(conn, user_id).await?;
                }
                Effect::AvailabilityNotice { user_id } => {
                    let notice = AvailabilityNotice {
                        user_id,
                        book_id,
                        book_title: title.to_string(),
                    };
                    let notification = repo
                        .notifications
                        .insert(conn, user_id, Some(book_id), KIND_BOOK_AVAILABLE, &notice.message())
                        .await?;
                    notices.push((notification, notice));
                }
            }
        }

        Ok(notices)
    }
}
