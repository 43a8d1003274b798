//! Per-book ledger and loan state transitions

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::{Effect, LoanPolicy};
use crate::{
    error::{AppError, AppResult},
    models::loan::{CloseReason, LoanState},
};

/// The open loan of a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub user_id: i32,
    pub state: LoanState,
    pub due_date: Option<DateTime<Utc>>,
    pub nb_renews: i16,
}

impl Holding {
    fn new(user_id: i32, state: LoanState) -> Self {
        Self {
            user_id,
            state,
            due_date: None,
            nb_renews: 0,
        }
    }
}

/// Snapshot of one book's circulation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLedger {
    book_id: i32,
    holding: Option<Holding>,
    queue: VecDeque<i32>,
}

impl BookLedger {
    pub fn new(book_id: i32, holding: Option<Holding>, queue: impl IntoIterator<Item = i32>) -> Self {
        Self {
            book_id,
            holding,
            queue: queue.into_iter().collect(),
        }
    }

    pub fn book_id(&self) -> i32 {
        self.book_id
    }

    pub fn is_available(&self) -> bool {
        self.holding.is_none()
    }

    pub fn holding(&self) -> Option<&Holding> {
        self.holding.as_ref()
    }

    pub fn queue(&self) -> impl Iterator<Item = i32> + '_ {
        self.queue.iter().copied()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Holder is never queued, queue has no duplicates, queue implies unavailable
    pub fn is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let unique = self.queue.iter().all(|u| seen.insert(*u));
        let holder_not_queued = self
            .holding
            .as_ref()
            .map(|h| !self.queue.contains(&h.user_id))
            .unwrap_or(true);
        let queue_implies_unavailable = self.queue.is_empty() || self.holding.is_some();
        let holding_open = self
            .holding
            .as_ref()
            .map(|h| h.state.is_open())
            .unwrap_or(true);

        unique && holder_not_queued && queue_implies_unavailable && holding_open
    }

    fn held_by(&self, user_id: i32) -> Option<&Holding> {
        self.holding.as_ref().filter(|h| h.user_id == user_id)
    }

    fn is_queued(&self, user_id: i32) -> bool {
        self.queue.contains(&user_id)
    }

    /// Open a loan for `user_id`. The book is unavailable from this point on.
    pub fn request_loan(
        &mut self,
        user_id: i32,
        open_loans: u32,
        policy: &LoanPolicy,
    ) -> AppResult<Vec<Effect>> {
        if self.held_by(user_id).is_some() {
            return Err(AppError::Conflict(format!(
                "You already hold book {}",
                self.book_id
            )));
        }
        if self.is_queued(user_id) {
            return Err(AppError::Conflict(format!(
                "You are already waiting for book {}",
                self.book_id
            )));
        }
        if self.holding.is_some() {
            return Err(AppError::Conflict(format!(
                "Book {} is not available",
                self.book_id
            )));
        }
        if policy.max_active_loans > 0 && open_loans >= policy.max_active_loans {
            return Err(AppError::Conflict(format!(
                "Maximum loans reached ({}/{})",
                open_loans, policy.max_active_loans
            )));
        }

        let state = policy.initial_state();
        self.holding = Some(Holding::new(user_id, state));

        Ok(self.checked(vec![
            Effect::LoanOpened { user_id, state },
            Effect::AvailabilityChanged { available: false },
        ]))
    }

    /// Admin acceptance of a request: `requested → awaiting_pickup`
    pub fn approve_request(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        self.advance(user_id, LoanState::Requested, LoanState::AwaitingPickup, None)
    }

    /// Book handed over: `awaiting_pickup → active`, due date stamped
    pub fn confirm_pickup(
        &mut self,
        user_id: i32,
        now: DateTime<Utc>,
        policy: &LoanPolicy,
    ) -> AppResult<Vec<Effect>> {
        let due_date = now + policy.loan_period;
        self.advance(
            user_id,
            LoanState::AwaitingPickup,
            LoanState::Active,
            Some(due_date),
        )
    }

    /// Reader announces a return: `active → return_requested`
    pub fn request_return(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        let holding = self.held_by(user_id).ok_or_else(|| {
            AppError::NotHolder(format!("You do not hold book {}", self.book_id))
        })?;
        if holding.state != LoanState::Active {
            return Err(AppError::InvalidState(format!(
                "Loan of book {} is {}, not active",
                self.book_id, holding.state
            )));
        }
        let due_date = holding.due_date;
        self.advance(user_id, LoanState::Active, LoanState::ReturnRequested, due_date)
    }

    /// Close a pending return, then hand the book to the next reader or free it
    pub fn approve_return(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        self.expect_state(user_id, LoanState::ReturnRequested)?;

        self.holding = None;
        let mut effects = vec![
            Effect::LoanClosed {
                user_id,
                reason: CloseReason::Returned,
            },
            Effect::ReadCredited { user_id },
        ];
        self.release(&mut effects);

        Ok(self.checked(effects))
    }

    /// Withdraw a loan that was not picked up yet
    pub fn cancel_request(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        let holding = self.held_by(user_id).ok_or_else(|| {
            AppError::NotHolder(format!("You have no request on book {}", self.book_id))
        })?;
        if !holding.state.is_cancellable() {
            return Err(AppError::InvalidState(format!(
                "Loan of book {} is {} and can no longer be cancelled",
                self.book_id, holding.state
            )));
        }

        self.holding = None;
        let mut effects = vec![Effect::LoanClosed {
            user_id,
            reason: CloseReason::Cancelled,
        }];
        self.release(&mut effects);

        Ok(self.checked(effects))
    }

    /// Push the due date of an active loan back by one loan period, only while nobody is waiting
    pub fn renew(
        &mut self,
        user_id: i32,
        now: DateTime<Utc>,
        policy: &LoanPolicy,
    ) -> AppResult<Vec<Effect>> {
        let book_id = self.book_id;
        let waiting = !self.queue.is_empty();
        let holding = self
            .holding
            .as_mut()
            .filter(|h| h.user_id == user_id)
            .ok_or_else(|| AppError::NotHolder(format!("You do not hold book {}", book_id)))?;

        if holding.state != LoanState::Active {
            return Err(AppError::InvalidState(format!(
                "Loan of book {} is {}, not active",
                book_id, holding.state
            )));
        }
        if waiting {
            return Err(AppError::Conflict(format!(
                "Other readers are waiting for book {}",
                book_id
            )));
        }
        if holding.nb_renews >= policy.max_renewals {
            return Err(AppError::Conflict(format!(
                "Maximum renewals reached ({}/{})",
                holding.nb_renews, policy.max_renewals
            )));
        }

        let due_date = holding.due_date.unwrap_or(now) + policy.loan_period;
        holding.due_date = Some(due_date);
        holding.nb_renews += 1;
        let nb_renews = holding.nb_renews;

        Ok(self.checked(vec![Effect::LoanRenewed {
            user_id,
            due_date,
            nb_renews,
        }]))
    }

    /// Append the user to the wait queue of an unavailable book
    pub fn join_queue(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        if self.held_by(user_id).is_some() {
            return Err(AppError::Conflict(format!(
                "You already hold book {}",
                self.book_id
            )));
        }
        if self.is_queued(user_id) {
            return Err(AppError::Conflict(format!(
                "You are already waiting for book {}",
                self.book_id
            )));
        }
        if self.holding.is_none() {
            return Err(AppError::Conflict(format!(
                "Book {} is available, request it instead",
                self.book_id
            )));
        }

        self.queue.push_back(user_id);
        Ok(self.checked(vec![Effect::Enqueued { user_id }]))
    }

    /// Remove the user from the wait queue, keeping everyone else's order
    pub fn leave_queue(&mut self, user_id: i32) -> AppResult<Vec<Effect>> {
        let position = self
            .queue
            .iter()
            .position(|u| *u == user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("You are not waiting for book {}", self.book_id))
            })?;

        self.queue.remove(position);
        Ok(self.checked(vec![Effect::Dequeued { user_id }]))
    }

    /// Admin transitions address the loan by its holder. A missing or
    /// mismatched holding means there is no loan in the expected state.
    fn expect_state(&self, user_id: i32, expected: LoanState) -> AppResult<()> {
        match self.held_by(user_id) {
            Some(h) if h.state == expected => Ok(()),
            Some(h) => Err(AppError::InvalidState(format!(
                "Loan of book {} is {}, expected {}",
                self.book_id, h.state, expected
            ))),
            None => Err(AppError::InvalidState(format!(
                "No {} loan of book {} for user {}",
                expected, self.book_id, user_id
            ))),
        }
    }

    fn advance(
        &mut self,
        user_id: i32,
        from: LoanState,
        to: LoanState,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Effect>> {
        self.expect_state(user_id, from)?;

        if let Some(holding) = self.holding.as_mut() {
            holding.state = to;
            holding.due_date = due_date;
        }

        Ok(self.checked(vec![Effect::LoanAdvanced {
            user_id,
            state: to,
            due_date,
        }]))
    }

    /// Give a freed book to the head of the queue, or make it available
    fn release(&mut self, effects: &mut Vec<Effect>) {
        match self.queue.pop_front() {
            Some(next) => {
                self.holding = Some(Holding::new(next, LoanState::AwaitingPickup));
                effects.push(Effect::Dequeued { user_id: next });
                effects.push(Effect::LoanOpened {
                    user_id: next,
                    state: LoanState::AwaitingPickup,
                });
                effects.push(Effect::AvailabilityNotice { user_id: next });
            }
            None => effects.push(Effect::AvailabilityChanged { available: true }),
        }
    }

    fn checked(&self, effects: Vec<Effect>) -> Vec<Effect> {
        debug_assert!(self.is_consistent(), "ledger invariant broken: {:?}", self);
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const BOOK: i32 = 42;
    const U1: i32 = 1;
    const U2: i32 = 2;
    const U3: i32 = 3;

    fn policy() -> LoanPolicy {
        LoanPolicy::default()
    }

    fn available_book() -> BookLedger {
        BookLedger::new(BOOK, None, [])
    }

    fn queue_of(ledger: &BookLedger) -> Vec<i32> {
        ledger.queue().collect()
    }

    /// Book held by `user` in `state`
    fn held(user: i32, state: LoanState, queue: &[i32]) -> BookLedger {
        BookLedger::new(
            BOOK,
            Some(Holding::new(user, state)),
            queue.iter().copied(),
        )
    }

    #[test]
    fn test_request_loan_marks_book_unavailable() {
        let mut book = available_book();
        let effects = book.request_loan(U1, 0, &policy()).unwrap();

        assert!(!book.is_available());
        assert_eq!(book.holding().unwrap().state, LoanState::AwaitingPickup);
        assert_eq!(
            effects,
            vec![
                Effect::LoanOpened { user_id: U1, state: LoanState::AwaitingPickup },
                Effect::AvailabilityChanged { available: false },
            ]
        );
    }

    #[test]
    fn test_request_loan_starts_in_requested_when_approval_required() {
        let mut book = available_book();
        let policy = LoanPolicy { require_approval: true, ..policy() };
        book.request_loan(U1, 0, &policy).unwrap();
        assert_eq!(book.holding().unwrap().state, LoanState::Requested);

        assert!(matches!(
            book.confirm_pickup(U1, Utc::now(), &policy),
            Err(AppError::InvalidState(_))
        ));
        book.approve_request(U1).unwrap();
        assert_eq!(book.holding().unwrap().state, LoanState::AwaitingPickup);
    }

    #[test]
    fn test_request_loan_on_unavailable_book_conflicts_without_queueing() {
        let mut book = held(U1, LoanState::Active, &[]);
        let before = book.clone();

        assert!(matches!(
            book.request_loan(U2, 0, &policy()),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(book, before);
        assert!(queue_of(&book).is_empty());
    }

    #[test]
    fn test_request_loan_rejects_holder_and_queued_user() {
        let mut book = held(U1, LoanState::AwaitingPickup, &[U2]);
        assert!(matches!(book.request_loan(U1, 1, &policy()), Err(AppError::Conflict(_))));
        assert!(matches!(book.request_loan(U2, 0, &policy()), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_request_loan_enforces_open_loan_limit() {
        let mut book = available_book();
        let policy = LoanPolicy { max_active_loans: 2, ..policy() };
        assert!(matches!(book.request_loan(U1, 2, &policy), Err(AppError::Conflict(_))));
        assert!(book.is_available());

        let unlimited = LoanPolicy { max_active_loans: 0, ..policy };
        assert!(book.request_loan(U1, 50, &unlimited).is_ok());
    }

    #[test]
    fn test_confirm_pickup_stamps_due_date_one_period_ahead() {
        let mut book = held(U1, LoanState::AwaitingPickup, &[]);
        let now = Utc::now();
        book.confirm_pickup(U1, now, &policy()).unwrap();

        let holding = book.holding().unwrap();
        assert_eq!(holding.state, LoanState::Active);
        assert_eq!(holding.due_date, Some(now + Duration::days(7)));
    }

    #[test]
    fn test_confirm_pickup_only_from_awaiting_pickup() {
        let mut active = held(U1, LoanState::Active, &[]);
        assert!(matches!(
            active.confirm_pickup(U1, Utc::now(), &policy()),
            Err(AppError::InvalidState(_))
        ));

        let mut free = available_book();
        assert!(matches!(
            free.confirm_pickup(U1, Utc::now(), &policy()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_request_return_requires_holder() {
        let mut book = held(U1, LoanState::Active, &[]);
        assert!(matches!(book.request_return(U2), Err(AppError::NotHolder(_))));

        book.request_return(U1).unwrap();
        assert_eq!(book.holding().unwrap().state, LoanState::ReturnRequested);

        assert!(matches!(book.request_return(U1), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_request_return_keeps_due_date() {
        let mut book = held(U1, LoanState::AwaitingPickup, &[]);
        let now = Utc::now();
        book.confirm_pickup(U1, now, &policy()).unwrap();
        book.request_return(U1).unwrap();
        assert_eq!(book.holding().unwrap().due_date, Some(now + Duration::days(7)));
    }

    #[test]
    fn test_approve_return_with_empty_queue_frees_book() {
        let mut book = held(U1, LoanState::ReturnRequested, &[]);
        let effects = book.approve_return(U1).unwrap();

        assert!(book.is_available());
        assert!(book.holding().is_none());
        assert_eq!(
            effects,
            vec![
                Effect::LoanClosed { user_id: U1, reason: CloseReason::Returned },
                Effect::ReadCredited { user_id: U1 },
                Effect::AvailabilityChanged { available: true },
            ]
        );
    }

    #[test]
    fn test_approve_return_hands_book_to_queue_head() {
        let mut book = held(U1, LoanState::ReturnRequested, &[U2, U3]);
        let effects = book.approve_return(U1).unwrap();

        let holding = book.holding().unwrap();
        assert_eq!(holding.user_id, U2);
        assert_eq!(holding.state, LoanState::AwaitingPickup);
        assert_eq!(holding.due_date, None);
        assert_eq!(queue_of(&book), vec![U3]);
        assert!(effects.contains(&Effect::AvailabilityNotice { user_id: U2 }));
        assert!(!effects.iter().any(|e| matches!(e, Effect::AvailabilityChanged { .. })));
    }

    #[test]
    fn test_approve_return_twice_is_invalid_state() {
        let mut book = held(U1, LoanState::ReturnRequested, &[]);
        book.approve_return(U1).unwrap();
        assert!(matches!(book.approve_return(U1), Err(AppError::InvalidState(_))));

        let mut handed_over = held(U1, LoanState::ReturnRequested, &[U2]);
        handed_over.approve_return(U1).unwrap();
        assert!(matches!(handed_over.approve_return(U1), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_approve_return_requires_pending_return() {
        let mut book = held(U1, LoanState::Active, &[]);
        assert!(matches!(book.approve_return(U1), Err(AppError::InvalidState(_))));
        assert_eq!(book.holding().unwrap().state, LoanState::Active);
    }

    #[test]
    fn test_cancel_request_with_empty_queue_frees_book() {
        let mut book = available_book();
        book.request_loan(U1, 0, &policy()).unwrap();
        let effects = book.cancel_request(U1).unwrap();

        assert!(book.is_available());
        assert!(queue_of(&book).is_empty());
        assert_eq!(
            effects,
            vec![
                Effect::LoanClosed { user_id: U1, reason: CloseReason::Cancelled },
                Effect::AvailabilityChanged { available: true },
            ]
        );
    }

    #[test]
    fn test_cancel_request_with_waiting_readers_hands_book_over() {
        let mut book = held(U1, LoanState::AwaitingPickup, &[U2]);
        book.cancel_request(U1).unwrap();

        assert_eq!(book.holding().unwrap().user_id, U2);
        assert!(queue_of(&book).is_empty());
    }

    #[test]
    fn test_cancel_request_rules() {
        let mut book = held(U1, LoanState::Active, &[]);
        assert!(matches!(book.cancel_request(U1), Err(AppError::InvalidState(_))));
        assert!(matches!(book.cancel_request(U2), Err(AppError::NotHolder(_))));

        let mut requested = held(U1, LoanState::Requested, &[]);
        assert!(requested.cancel_request(U1).is_ok());
    }

    #[test]
    fn test_join_queue_rules() {
        let mut free = available_book();
        assert!(matches!(free.join_queue(U2), Err(AppError::Conflict(_))));

        let mut book = held(U1, LoanState::Active, &[]);
        assert!(matches!(book.join_queue(U1), Err(AppError::Conflict(_))));
        book.join_queue(U2).unwrap();
        assert!(matches!(book.join_queue(U2), Err(AppError::Conflict(_))));
        assert_eq!(queue_of(&book), vec![U2]);
    }

    #[test]
    fn test_leave_queue_preserves_order() {
        let mut book = held(U1, LoanState::Active, &[U2, U3, 4]);
        book.leave_queue(U3).unwrap();
        assert_eq!(queue_of(&book), vec![U2, 4]);

        assert!(matches!(book.leave_queue(U3), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_renew_extends_due_date_when_nobody_waits() {
        let mut book = held(U1, LoanState::Active, &[]);
        let now = Utc::now();
        book.renew(U1, now, &policy()).unwrap();
        assert_eq!(book.holding().unwrap().nb_renews, 1);
        assert_eq!(book.holding().unwrap().due_date, Some(now + Duration::days(7)));

        assert!(matches!(book.renew(U1, now, &policy()), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_renew_adds_one_period_to_current_due_date() {
        let policy = policy();
        let mut book = available_book();
        let picked_up = Utc::now();

        book.request_loan(U1, 0, &policy).unwrap();
        book.confirm_pickup(U1, picked_up, &policy).unwrap();
        let first_due = book.holding().unwrap().due_date.unwrap();
        assert_eq!(first_due, picked_up + Duration::days(7));

        let effects = book.renew(U1, picked_up + Duration::days(1), &policy).unwrap();
        let renewed_due = first_due + Duration::days(7);
        assert_eq!(book.holding().unwrap().due_date, Some(renewed_due));
        assert_eq!(
            effects,
            vec![Effect::LoanRenewed { user_id: U1, due_date: renewed_due, nb_renews: 1 }]
        );
    }

    #[test]
    fn test_renew_refused_while_someone_waits() {
        let mut book = held(U1, LoanState::Active, &[U2]);
        assert!(matches!(book.renew(U1, Utc::now(), &policy()), Err(AppError::Conflict(_))));
        assert!(matches!(book.renew(U2, Utc::now(), &policy()), Err(AppError::NotHolder(_))));
    }

    #[test]
    fn test_full_scenario_with_waiting_reader() {
        let policy = policy();
        let mut book = available_book();

        book.request_loan(U1, 0, &policy).unwrap();
        assert!(!book.is_available());

        assert!(matches!(book.request_loan(U2, 0, &policy), Err(AppError::Conflict(_))));
        book.join_queue(U2).unwrap();
        assert_eq!(queue_of(&book), vec![U2]);

        book.confirm_pickup(U1, Utc::now(), &policy).unwrap();
        book.request_return(U1).unwrap();
        let effects = book.approve_return(U1).unwrap();

        let holding = book.holding().unwrap();
        assert_eq!(holding.user_id, U2);
        assert_eq!(holding.state, LoanState::AwaitingPickup);
        assert!(queue_of(&book).is_empty());
        assert!(effects.contains(&Effect::AvailabilityNotice { user_id: U2 }));
    }

    /// Drive random operations and check the ledger never breaks its invariants
    /// and that rejected operations leave it untouched.
    #[test]
    fn test_random_walk_keeps_invariants() {
        let policy = LoanPolicy { max_active_loans: 0, max_renewals: 2, ..policy() };
        let mut rng = StdRng::seed_from_u64(0x11b4a1);

        for _ in 0..200 {
            let mut book = available_book();
            for _ in 0..60 {
                let user = rng.gen_range(1..=5);
                let before = book.clone();
                let queue_before = book.queue_len();
                let result = match rng.gen_range(0..8) {
                    0 => book.request_loan(user, 0, &policy),
                    1 => book.confirm_pickup(user, Utc::now(), &policy),
                    2 => book.request_return(user),
                    3 => book.approve_return(user),
                    4 => book.cancel_request(user),
                    5 => book.join_queue(user),
                    6 => book.leave_queue(user),
                    _ => book.renew(user, Utc::now(), &policy),
                };

                assert!(book.is_consistent(), "broken ledger: {:?}", book);
                match result {
                    Err(_) => assert_eq!(book, before),
                    Ok(effects) => {
                        if effects.contains(&Effect::LoanClosed { user_id: user, reason: CloseReason::Returned })
                            && queue_before > 0
                        {
                            assert_eq!(book.queue_len(), queue_before - 1);
                            assert_eq!(book.holding().unwrap().state, LoanState::AwaitingPickup);
                        }
                    }
                }
            }
        }
    }
}
