//! Business logic services

pub mod catalog;
pub mod email;
pub mod loans;
pub mod notifications;
pub mod reviews;
pub mod shelves;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{
    circulation::LoanPolicy,
    config::{AuthConfig, EmailConfig, LoansConfig},
    repository::Repository,
};

use notifications::{EmailSink, NoticeSink, NotificationHub};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reviews: reviews::ReviewsService,
    pub shelves: shelves::ShelvesService,
    pub notifications: notifications::NotificationsService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        auth_config: AuthConfig,
        email_config: EmailConfig,
        loans_config: &LoansConfig,
    ) -> Self {
        let email = email::EmailService::new(email_config);

        let mut sinks: Vec<Arc<dyn NoticeSink>> = Vec::new();
        if email.is_enabled() {
            sinks.push(Arc::new(EmailSink::new(repository.clone(), email)));
        }
        let hub = NotificationHub::new(sinks);

        Self {
            users: users::UsersService::new(repository.clone(), auth_config),
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), LoanPolicy::from(loans_config), hub.clone()),
            reviews: reviews::ReviewsService::new(repository.clone()),
            shelves: shelves::ShelvesService::new(repository.clone()),
            notifications: notifications::NotificationsService::new(repository.clone(), hub),
            stats: stats::StatsService::new(repository),
        }
    }
}
