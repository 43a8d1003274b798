//! Custom shelf endpoints. Every shelf belongs to the caller.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::shelf::{Shelf, ShelfBook, ShelfDetails, ShelfName},
};

use super::AuthenticatedUser;

#[utoipa::path(
    get,
    path = "/shelves",
    tag = "shelves",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own shelves", body = Vec<Shelf>)
    )
)]
pub async fn list_shelves(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Shelf>>> {
    let shelves = state.services.shelves.list(claims.user_id).await?;
    Ok(Json(shelves))
}

#[utoipa::path(
    post,
    path = "/shelves",
    tag = "shelves",
    security(("bearer_auth" = [])),
    request_body = ShelfName,
    responses(
        (status = 201, description = "Shelf created", body = Shelf),
        (status = 409, description = "Shelf name already used")
    )
)]
pub async fn create_shelf(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<ShelfName>,
) -> AppResult<(StatusCode, Json<Shelf>)> {
    data.validate()?;

    let shelf = state.services.shelves.create(claims.user_id, &data.name).await?;
    Ok((StatusCode::CREATED, Json(shelf)))
}

#[utoipa::path(
    get,
    path = "/shelves/{id}",
    tag = "shelves",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Shelf ID")),
    responses(
        (status = 200, description = "Shelf with its books", body = ShelfDetails),
        (status = 404, description = "Shelf not found")
    )
)]
pub async fn get_shelf(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ShelfDetails>> {
    let shelf = state.services.shelves.get(id, claims.user_id).await?;
    Ok(Json(shelf))
}

#[utoipa::path(
    put,
    path = "/shelves/{id}",
    tag = "shelves",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Shelf ID")),
    request_body = ShelfName,
    responses(
        (status = 200, description = "Shelf renamed", body = Shelf),
        (status = 404, description = "Shelf not found"),
        (status = 409, description = "Shelf name already used")
    )
)]
pub async fn rename_shelf(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<ShelfName>,
) -> AppResult<Json<Shelf>> {
    data.validate()?;

    let shelf = state.services.shelves.rename(id, claims.user_id, &data.name).await?;
    Ok(Json(shelf))
}

#[utoipa::path(
    delete,
    path = "/shelves/{id}",
    tag = "shelves",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Shelf ID")),
    responses(
        (status = 204, description = "Shelf deleted"),
        (status = 404, description = "Shelf not found")
    )
)]
pub async fn delete_shelf(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.shelves.delete(id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/shelves/{id}/books",
    tag = "shelves",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Shelf ID")),
    request_body = ShelfBook,
    responses(
        (status = 200, description = "Book on shelf", body = ShelfDetails),
        (status = 404, description = "Shelf or book not found")
    )
)]
pub async fn add_shelf_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<ShelfBook>,
) -> AppResult<Json<ShelfDetails>> {
    let shelf = state
        .services
        .shelves
        .add_book(id, claims.user_id, data.book_id)
        .await?;
    Ok(Json(shelf))
}

#[utoipa::path(
    delete,
    path = "/shelves/{id}/books/{book_id}",
    tag = "shelves",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Shelf ID"),
        ("book_id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book removed from shelf"),
        (status = 404, description = "Book not on shelf")
    )
)]
pub async fn remove_shelf_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((id, book_id)): Path<(i32, i32)>,
) -> AppResult<StatusCode> {
    state
        .services
        .shelves
        .remove_book(id, claims.user_id, book_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
