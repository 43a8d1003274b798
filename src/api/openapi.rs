//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, notifications, reviews, shelves, stats, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Librain API",
        version = "1.0.0",
        description = "Library Loan Management REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::list_genres,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::request_loan,
        loans::cancel_request,
        loans::get_book_loan,
        loans::request_return,
        loans::renew_loan,
        loans::get_book_queue,
        loans::join_queue,
        loans::leave_queue,
        loans::approve_request,
        loans::confirm_pickup,
        loans::approve_return,
        loans::list_loans,
        loans::get_user_loans,
        loans::get_user_history,
        loans::get_user_queue,
        // Users
        users::list_users,
        users::get_user,
        users::update_my_profile,
        users::update_role,
        users::list_favorites,
        users::add_favorite,
        users::remove_favorite,
        // Reviews
        reviews::list_reviews,
        reviews::get_rating,
        reviews::upsert_review,
        reviews::delete_review,
        // Shelves
        shelves::list_shelves,
        shelves::create_shelf,
        shelves::get_shelf,
        shelves::rename_shelf,
        shelves::delete_shelf,
        shelves::add_shelf_book,
        shelves::remove_shelf_book,
        // Notifications
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::stream,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            books::PaginatedBooks,
            // Users
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::Role,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRole,
            books::PaginatedUsers,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanState,
            crate::models::loan::CloseReason,
            crate::models::loan::LoanDetails,
            crate::models::loan::QueueEntry,
            loans::AdminLoanAction,
            loans::ReturnResponse,
            loans::QueuePosition,
            books::PaginatedLoans,
            // Reviews
            crate::models::review::Review,
            crate::models::review::ReviewWithAuthor,
            crate::models::review::UpsertReview,
            crate::models::review::RatingSummary,
            // Shelves
            crate::models::shelf::Shelf,
            crate::models::shelf::ShelfDetails,
            crate::models::shelf::ShelfName,
            crate::models::shelf::ShelfBook,
            // Notifications
            crate::models::notification::Notification,
            notifications::UnreadCount,
            notifications::MarkedCount,
            books::PaginatedNotifications,
            // Stats
            stats::StatsResponse,
            stats::UserStats,
            stats::BookStats,
            stats::LoanStats,
            stats::StatEntry,
            stats::BorrowedBook,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "books", description = "Book catalog"),
        (name = "loans", description = "Loan workflow and wait queues"),
        (name = "users", description = "User management and favorites"),
        (name = "reviews", description = "Book reviews"),
        (name = "shelves", description = "Custom shelves"),
        (name = "notifications", description = "Availability notifications"),
        (name = "stats", description = "Admin dashboard statistics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_workflow_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/books/{id}/loan",
            "/books/{id}/queue",
            "/admin/books/{id}/pickup",
            "/admin/books/{id}/approve-return",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth")));
    }
}
