use chrono::Utc;

use crate::db::models::Identity;
use crate::error::{AppError, AppResult};
use crate::identity::pin::Pin;
use crate::store::LocalStore;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

/// Local accounts and the single active-identity slot.
pub struct IdentityService {
    store: LocalStore,
    bcrypt_cost: u32,
}

impl IdentityService {
    pub fn new(store: LocalStore, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    /// Create an identity and make it active in one transaction.
    pub async fn register(&self, username: &str, email: &str, pin: &str) -> AppResult<Identity> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;
        let pin = Pin::hash(pin, self.bcrypt_cost)?;

        if self
            .store
            .get::<Identity>(&username.to_string())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let identity = Identity {
            username: username.to_string(),
            email: email.to_string(),
            credential: pin.into_inner(),
            joined_at: Utc::now(),
        };
        self.store.register_identity_atomic(&identity).await?;

        tracing::info!("Registered identity {}", identity.username);
        Ok(identity)
    }

    pub async fn login(&self, username: &str, pin: &str) -> AppResult<Identity> {
        let identity = self
            .store
            .get::<Identity>(&username.trim().to_string())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !Pin::from_hash(identity.credential.as_str()).verify(pin) {
            tracing::warn!("Failed login for {}", identity.username);
            return Err(AppError::Unauthorized);
        }

        self.store
            .set_active_identity(Some(&identity.username))
            .await?;
        tracing::info!("{} logged in", identity.username);
        Ok(identity)
    }

    pub async fn logout(&self) -> AppResult<()> {
        self.store.set_active_identity(None).await?;
        Ok(())
    }

    pub async fn active(&self) -> AppResult<Option<Identity>> {
        Ok(self.store.active_identity().await?)
    }
}

fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::InvalidInput(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AppError::InvalidInput(
            "Username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(AppError::InvalidInput("Invalid email address".into()))
    }
}
