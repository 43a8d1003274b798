//! Notification hub.
//!
//! Availability notices are persisted by the loans service inside its
//! transaction. Once committed they are handed to [`NotificationHub::dispatch`],
//! which broadcasts them to live subscribers (the SSE stream) and to every
//! configured [`NoticeSink`]. Delivery failures are logged and dropped: the
//! loan transition already happened.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    error::AppResult,
    models::notification::{AvailabilityNotice, Notification, NotificationQuery},
    repository::Repository,
    services::email::EmailService,
};

/// Buffered notices per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// Out-of-process delivery of availability notices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoticeSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notice: &AvailabilityNotice) -> AppResult<()>;
}

/// Sends availability notices by e-mail to readers that have an address
pub struct EmailSink {
    repository: Repository,
    email: EmailService,
}

impl EmailSink {
    pub fn new(repository: Repository, email: EmailService) -> Self {
        Self { repository, email }
    }
}

#[async_trait]
impl NoticeSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, notice: &AvailabilityNotice) -> AppResult<()> {
        let user = self.repository.users.get_by_id(notice.user_id).await?;
        match user.email.as_deref() {
            Some(address) => self.email.send_availability_notice(address, notice).await,
            None => {
                tracing::debug!(user_id = notice.user_id, "No e-mail address, notice not mailed");
                Ok(())
            }
        }
    }
}

#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
    sinks: Vec<Arc<dyn NoticeSink>>,
}

impl NotificationHub {
    pub fn new(sinks: Vec<Arc<dyn NoticeSink>>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, sinks }
    }

    /// Live feed of every committed notification
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Fan out committed notices in the background so slow sinks do not
    /// hold up the request that triggered them
    pub fn spawn_dispatch(
        &self,
        notices: Vec<(Notification, AvailabilityNotice)>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move { hub.dispatch(notices).await })
    }

    /// Fan out committed notices. Never fails.
    pub async fn dispatch(&self, notices: Vec<(Notification, AvailabilityNotice)>) {
        for (notification, notice) in notices {
            // No subscriber is not an error
            let _ = self.sender.send(notification);

            for sink in &self.sinks {
                if let Err(e) = sink.deliver(&notice).await {
                    tracing::warn!(
                        sink = sink.name(),
                        user_id = notice.user_id,
                        book_id = notice.book_id,
                        "Availability notice delivery failed: {}",
                        e
                    );
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct NotificationsService {
    repository: Repository,
    hub: NotificationHub,
}

impl NotificationsService {
    pub fn new(repository: Repository, hub: NotificationHub) -> Self {
        Self { repository, hub }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub async fn list(&self, user_id: i32, query: &NotificationQuery) -> AppResult<(Vec<Notification>, i64)> {
        self.repository.notifications.list(user_id, query).await
    }

    pub async fn count_unread(&self, user_id: i32) -> AppResult<i64> {
        self.repository.notifications.count_unread(user_id).await
    }

    pub async fn mark_read(&self, id: i32, user_id: i32) -> AppResult<()> {
        self.repository.notifications.mark_read(id, user_id).await
    }

    pub async fn mark_all_read(&self, user_id: i32) -> AppResult<u64> {
        self.repository.notifications.mark_all_read(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AppError, models::notification::KIND_BOOK_AVAILABLE};
    use chrono::Utc;

    fn notice(user_id: i32) -> (Notification, AvailabilityNotice) {
        let notice = AvailabilityNotice {
            user_id,
            book_id: 7,
            book_title: "Dune".to_string(),
        };
        let notification = Notification {
            id: user_id,
            user_id,
            book_id: Some(7),
            kind: KIND_BOOK_AVAILABLE.to_string(),
            message: notice.message(),
            created_at: Utc::now(),
            read_at: None,
        };
        (notification, notice)
    }

    #[tokio::test]
    async fn test_dispatch_delivers_to_every_sink() {
        let mut sink = MockNoticeSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_deliver()
            .withf(|n| n.user_id == 2 && n.book_id == 7)
            .times(1)
            .returning(|_| Ok(()));

        let hub = NotificationHub::new(vec![Arc::new(sink)]);
        hub.dispatch(vec![notice(2)]).await;
    }

    #[tokio::test]
    async fn test_dispatch_broadcasts_to_subscribers() {
        let hub = NotificationHub::new(Vec::new());
        let mut rx = hub.subscribe();

        hub.dispatch(vec![notice(3)]).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, 3);
        assert_eq!(received.kind, KIND_BOOK_AVAILABLE);
    }

    /// Sink that blocks until released
    struct GatedSink {
        gate: Arc<tokio::sync::Notify>,
        delivered: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl NoticeSink for GatedSink {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn deliver(&self, _notice: &AvailabilityNotice) -> AppResult<()> {
            self.gate.notified().await;
            self.delivered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawned_dispatch_does_not_wait_for_slow_sinks() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let delivered = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hub = NotificationHub::new(vec![Arc::new(GatedSink {
            gate: gate.clone(),
            delivered: delivered.clone(),
        })]);
        let mut rx = hub.subscribe();

        let handle = hub.spawn_dispatch(vec![notice(4)]);

        // Live subscribers are served before the sink finishes
        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, 4);
        assert!(!handle.is_finished());
        assert_eq!(delivered.load(std::sync::atomic::Ordering::SeqCst), 0);

        gate.notify_one();
        handle.await.unwrap();
        assert_eq!(delivered.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_other_sinks() {
        let mut failing = MockNoticeSink::new();
        failing.expect_name().return_const("failing");
        failing
            .expect_deliver()
            .times(2)
            .returning(|_| Err(AppError::Internal("smtp down".to_string())));

        let mut working = MockNoticeSink::new();
        working.expect_name().return_const("working");
        working.expect_deliver().times(2).returning(|_| Ok(()));

        let hub = NotificationHub::new(vec![Arc::new(failing), Arc::new(working)]);
        hub.dispatch(vec![notice(2), notice(3)]).await;
    }
}
