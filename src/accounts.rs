use crate::auth::{hash_password, verify_password, TokenAuthority};
use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, PublicUser};
use std::sync::Arc;

/// Registration and login on top of a [`UserStore`].
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    tokens: Arc<TokenAuthority>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, tokens: Arc<TokenAuthority>) -> Self {
        Self { store, tokens }
    }

    pub async fn register(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<PublicUser> {
        let (Some(name), Some(password)) = (present(name), present(password)) else {
            return Err(AppError::Validation(
                "name and password are required".to_string(),
            ));
        };

        if self.store.find_by_name(name).await?.is_some() {
            return Err(AppError::Conflict(format!("username '{name}' already exists")));
        }

        let password_hash = hash_password(password).await?;
        // insert re-checks the name under the store's lock.
        let user = self
            .store
            .insert(NewUser {
                name: name.to_string(),
                email: email.unwrap_or_default().to_string(),
                password_hash,
            })
            .await?;

        tracing::info!("Registered user {} ({})", user.id, user.name);
        Ok(user.public())
    }

    pub async fn login(&self, name: Option<&str>, password: Option<&str>) -> AppResult<String> {
        let (Some(name), Some(password)) = (present(name), present(password)) else {
            return Err(AppError::Validation(
                "name and password are required".to_string(),
            ));
        };

        let user = self
            .store
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        if !verify_password(password, &user.password_hash).await? {
            tracing::warn!("Failed login for user {}", user.name);
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }

        let token = self.tokens.issue(user.id, &user.name)?;
        tracing::info!("User {} logged in", user.id);
        Ok(token)
    }

    pub async fn get_user(&self, id: u64) -> AppResult<Option<PublicUser>> {
        Ok(self.store.find_by_id(id).await?.map(|u| u.public()))
    }

    pub async fn list_users(&self) -> AppResult<Vec<PublicUser>> {
        Ok(self
            .store
            .list_all()
            .await?
            .iter()
            .map(|u| u.public())
            .collect())
    }
}
