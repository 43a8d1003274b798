//! Custom shelves service

use crate::{
    error::{AppError, AppResult},
    models::shelf::{Shelf, ShelfDetails},
    repository::Repository,
};

/// Trimmed shelf name, rejected when nothing is left
fn shelf_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Shelf name must not be blank".to_string()));
    }
    Ok(name)
}

#[derive(Clone)]
pub struct ShelvesService {
    repository: Repository,
}

impl ShelvesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Load a shelf owned by `user_id`. Other users' shelves look missing.
    async fn owned(&self, id: i32, user_id: i32) -> AppResult<Shelf> {
        let shelf = self.repository.shelves.get(id).await?;
        if shelf.user_id != user_id {
            return Err(AppError::NotFound(format!("Shelf with id {} not found", id)));
        }
        Ok(shelf)
    }

    pub async fn list(&self, user_id: i32) -> AppResult<Vec<Shelf>> {
        self.repository.shelves.list_for_user(user_id).await
    }

    pub async fn get(&self, id: i32, user_id: i32) -> AppResult<ShelfDetails> {
        let shelf = self.owned(id, user_id).await?;
        let books = self.repository.shelves.books(id).await?;
        Ok(ShelfDetails { shelf, books })
    }

    pub async fn create(&self, user_id: i32, name: &str) -> AppResult<Shelf> {
        self.repository.shelves.create(user_id, shelf_name(name)?).await
    }

    pub async fn rename(&self, id: i32, user_id: i32, name: &str) -> AppResult<Shelf> {
        let name = shelf_name(name)?;
        self.owned(id, user_id).await?;
        self.repository.shelves.rename(id, user_id, name).await
    }

    pub async fn delete(&self, id: i32, user_id: i32) -> AppResult<()> {
        self.owned(id, user_id).await?;
        self.repository.shelves.delete(id).await
    }

    pub async fn add_book(&self, id: i32, user_id: i32, book_id: i32) -> AppResult<ShelfDetails> {
        self.owned(id, user_id).await?;
        self.repository.books.get_by_id(book_id).await?;
        self.repository.shelves.add_book(id, book_id).await?;
        self.get(id, user_id).await
    }

    pub async fn remove_book(&self, id: i32, user_id: i32, book_id: i32) -> AppResult<()> {
        self.owned(id, user_id).await?;
        self.repository.shelves.remove_book(id, book_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shelf_name_is_trimmed() {
        assert_eq!(shelf_name("  To read ").unwrap(), "To read");
    }

    #[test]
    fn test_blank_shelf_name_is_rejected() {
        for name in ["", "   ", "\t\n"] {
            assert!(matches!(shelf_name(name), Err(AppError::Validation(_))), "{:?}", name);
        }
    }
}
