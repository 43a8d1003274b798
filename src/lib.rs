//! Librain Library Loan Management System
//!
//! REST JSON backend for a lending library: book catalog, reader accounts,
//! the loan workflow with per-book wait queues, reviews, shelves and
//! availability notifications.

use std::sync::Arc;

pub mod api;
pub mod circulation;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
