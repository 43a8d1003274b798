//! Data models for Librain

pub mod book;
pub mod loan;
pub mod notification;
pub mod review;
pub mod shelf;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use loan::{Loan, LoanDetails, LoanState};
pub use notification::{AvailabilityNotice, Notification};
pub use review::Review;
pub use shelf::Shelf;
pub use user::{Role, User, UserShort};
