//! Accounts: signup, password login, cookie sessions, and password changes.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use pbkdf2::{
    Params, Pbkdf2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::validation::{
    DUPLICATE_USERNAME, FieldErrors, INVALID_LOGIN, REQUIRED, WRONG_OLD_PASSWORD, validate_email,
    validate_new_password, validate_username,
};

const HASH_OUTPUT_LEN: usize = 32;
const USERNAME_CONSTRAINT: &str = "users_username_key";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid account form: {0}")]
    Invalid(FieldErrors),
    #[error("user not found")]
    UnknownUser,
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<pbkdf2::password_hash::Error> for AccountError {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::PasswordHash(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// A freshly created session. `token` goes into the cookie and is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    pbkdf2_rounds: NonZeroU32,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        pbkdf2_rounds: NonZeroU32,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            pbkdf2_rounds,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<UserRecord, AccountError> {
        let username = form.username.trim();
        let email = form.email.trim();
        let mut errors = FieldErrors::new();

        if let Err(message) = validate_username(username) {
            errors.add("username", message);
        } else if self.users.find_user_by_username(username).await?.is_some() {
            errors.add("username", DUPLICATE_USERNAME);
        }
        if let Err(message) = validate_email(email) {
            errors.add("email", message);
        }
        validate_new_password(
            &mut errors,
            "password1",
            "password2",
            &form.password1,
            &form.password2,
            username,
        );
        errors.into_result().map_err(AccountError::Invalid)?;

        let password_hash = self.hash_password(&form.password1)?;
        let created = self
            .users
            .create_user(CreateUserParams {
                username: username.to_string(),
                first_name: form.first_name.trim().to_string(),
                last_name: form.last_name.trim().to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await;

        match created {
            Ok(user) => {
                info!(target = "penfeed::accounts", username = %user.username, "user signed up");
                Ok(user)
            }
            // Lost a race with a concurrent signup for the same name.
            Err(RepoError::Duplicate { constraint }) if constraint == USERNAME_CONSTRAINT => {
                let mut errors = FieldErrors::new();
                errors.add("username", DUPLICATE_USERNAME);
                Err(AccountError::Invalid(errors))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Check credentials and open a session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, IssuedSession), AccountError> {
        let mut errors = FieldErrors::new();
        if username.trim().is_empty() {
            errors.add("username", REQUIRED);
        }
        if password.is_empty() {
            errors.add("password", REQUIRED);
        }
        errors.into_result().map_err(AccountError::Invalid)?;

        let user = match self.users.find_user_by_username(username.trim()).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                debug!(target = "penfeed::accounts", username, "login rejected");
                let mut errors = FieldErrors::new();
                errors.add_non_field(INVALID_LOGIN);
                return Err(AccountError::Invalid(errors));
            }
        };

        let session = self.issue_session(user.id).await?;
        info!(target = "penfeed::accounts", username = %user.username, "user logged in");
        Ok((user, session))
    }

    /// Resolve the cookie token to its user; unknown or expired tokens are anonymous.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<UserRecord>, AccountError> {
        if token.is_empty() {
            return Ok(None);
        }
        let user = self
            .sessions
            .find_session_user(&hash_token(token), OffsetDateTime::now_utc())
            .await?;
        Ok(user)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AccountError> {
        self.sessions.delete_session(&hash_token(token)).await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        user: &UserRecord,
        form: &PasswordChangeForm,
    ) -> Result<(), AccountError> {
        let mut errors = FieldErrors::new();
        if form.old_password.is_empty() {
            errors.add("old_password", REQUIRED);
        } else if !verify_password(&form.old_password, &user.password_hash) {
            errors.add("old_password", WRONG_OLD_PASSWORD);
        }
        validate_new_password(
            &mut errors,
            "new_password1",
            "new_password2",
            &form.new_password1,
            &form.new_password2,
            &user.username,
        );
        errors.into_result().map_err(AccountError::Invalid)?;

        let password_hash = self.hash_password(&form.new_password1)?;
        self.users.update_password(user.id, &password_hash).await?;
        info!(target = "penfeed::accounts", username = %user.username, "password changed");
        Ok(())
    }

    /// Grant staff status; used by the operator CLI.
    pub async fn promote(&self, username: &str) -> Result<UserRecord, AccountError> {
        let mut user = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AccountError::UnknownUser)?;
        self.users.set_staff(user.id, true).await?;
        user.is_staff = true;
        Ok(user)
    }

    /// Drop sessions past their expiry; returns how many were removed.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AccountError> {
        Ok(self
            .sessions
            .delete_expired_sessions(OffsetDateTime::now_utc())
            .await?)
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AccountError> {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
        let params = Params {
            rounds: self.pbkdf2_rounds.get(),
            output_length: HASH_OUTPUT_LEN,
        };
        let hash =
            Pbkdf2.hash_password_customized(password.as_bytes(), None, None, params, &salt)?;
        Ok(hash.to_string())
    }

    async fn issue_session(&self, user_id: i64) -> Result<IssuedSession, AccountError> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;
        self.sessions
            .create_session(CreateSessionParams {
                token_hash: hash_token(&token),
                user_id,
                expires_at,
            })
            .await?;
        Ok(IssuedSession { token, expires_at })
    }
}

/// Malformed stored hashes never match.
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
