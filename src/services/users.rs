//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        book::BookShort,
        user::{RegisterUser, Role, UpdateProfile, User, UserClaims, UserQuery, UserShort},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a reader. The very first account becomes administrator.
    pub async fn register(&self, data: RegisterUser) -> AppResult<User> {
        if self.repository.users.national_id_exists(&data.national_id).await? {
            return Err(AppError::Conflict("National ID already registered".to_string()));
        }

        let password_hash = self.hash_password(&data.password)?;
        let user = self
            .repository
            .users
            .register(
                &data.national_id,
                &data.display_name,
                &password_hash,
                data.email.as_deref(),
            )
            .await?;

        tracing::info!(user_id = user.id, role = %user.role.as_str(), "User registered");
        Ok(user)
    }

    /// Check credentials and issue a JWT
    pub async fn authenticate(&self, national_id: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_national_id(national_id)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid national ID or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            return Err(AppError::Authentication("Invalid national ID or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.national_id.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        self.repository.users.search(query).await
    }

    /// Update own profile. Changing the password requires the current one.
    pub async fn update_profile(&self, user_id: i32, data: UpdateProfile) -> AppResult<User> {
        if let Some(ref new_password) = data.new_password {
            let user = self.repository.users.get_by_id(user_id).await?;
            let current = data.current_password.as_deref().ok_or_else(|| {
                AppError::Validation("Current password is required to set a new one".to_string())
            })?;
            if !self.verify_password(&user, current)? {
                return Err(AppError::Authentication("Current password is incorrect".to_string()));
            }
            let hash = self.hash_password(new_password)?;
            self.repository.users.update_password(user_id, &hash).await?;
            tracing::info!(user_id, "Password changed");
        }

        self.repository.users.update_profile(user_id, &data).await
    }

    pub async fn update_role(&self, user_id: i32, role: Role) -> AppResult<User> {
        let user = self.repository.users.update_role(user_id, role).await?;
        tracing::info!(user_id, role = %user.role.as_str(), "Role changed");
        Ok(user)
    }

    // =========================================================================
    // FAVORITES
    // =========================================================================

    pub async fn list_favorites(&self, user_id: i32) -> AppResult<Vec<BookShort>> {
        self.repository.users.list_favorites(user_id).await
    }

    pub async fn add_favorite(&self, user_id: i32, book_id: i32) -> AppResult<()> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.users.add_favorite(user_id, book_id).await
    }

    pub async fn remove_favorite(&self, user_id: i32, book_id: i32) -> AppResult<()> {
        self.repository.users.remove_favorite(user_id, book_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> UsersService {
        // Lazy pool: password helpers never touch the database
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/librain_test")
            .unwrap();
        UsersService::new(Repository::new(pool), AuthConfig::default())
    }

    fn user_with_hash(password_hash: String) -> User {
        User {
            id: 1,
            national_id: "A123".to_string(),
            display_name: "Ada".to_string(),
            password_hash,
            role: Role::Reader,
            email: None,
            avatar_url: None,
            bio: None,
            books_read: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_password_hash_roundtrip() {
        let service = service();
        let hash = service.hash_password("s3cret!").unwrap();
        assert_ne!(hash, "s3cret!");

        let user = user_with_hash(hash);
        assert!(service.verify_password(&user, "s3cret!").unwrap());
        assert!(!service.verify_password(&user, "wrong").unwrap());
    }

    #[tokio::test]
    async fn test_issued_token_carries_role() {
        let service = service();
        let user = user_with_hash(service.hash_password("pw1234").unwrap());
        let token = service.create_token_for_user(&user).unwrap();

        let claims = UserClaims::from_token(&token, &AuthConfig::default().jwt_secret).unwrap();
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.role, Role::Reader);
        assert_eq!(claims.sub, "A123");
    }
}
