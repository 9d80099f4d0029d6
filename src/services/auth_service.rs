//! Domain service for access-key authentication and quota enforcement.
//!
//! The gateway admits a request only after the authority has checked the
//! key's owner against its quota ceiling and bumped both usage counters in
//! the same transaction.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors specific to credential and quota operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access key is empty")]
    EmptyKey,

    #[error("user already exists")]
    DuplicateUser,

    #[error("access key already exists")]
    DuplicateKey,

    #[error("password is too long (maximum {0} bytes allowed)")]
    PasswordTooLong(usize),

    #[error("activation token already in use")]
    DuplicateActivationToken,

    #[error("max_requests {0} is out of range")]
    QuotaOutOfRange(u64),

    #[error("user not found")]
    UserNotFound,

    #[error("access key not found")]
    KeyNotFound,

    #[error("quota exceeded, max_requests: {max_requests}, request_count: {request_count}")]
    QuotaExceeded {
        max_requests: u64,
        request_count: u64,
    },

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid or expired activation token")]
    InvalidActivationToken,

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Account tier; premium accounts skip the heavy throttling applied to free
/// ones downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Free,
    Premium,
}

impl AccountType {
    /// Case-insensitive normalization: anything that is not "premium" is
    /// treated as a free account.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("premium") {
            Self::Premium
        } else {
            Self::Free
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    pub max_requests: u64,
    /// Raw account type as supplied by the caller; normalized on write.
    pub account_type: String,
    pub is_active: bool,
    pub activation_token: String,
}

/// Parameters for updating a user. An empty password leaves the stored hash
/// untouched.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    pub max_requests: u64,
    pub account_type: String,
}

/// Projection of a user row.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    pub username: String,
    pub hashed_password: String,
    pub is_admin: bool,
    pub max_requests: u64,
    pub request_count: u64,
    pub account_type: AccountType,
    pub is_active: bool,
}

/// Projection of an access key joined with its owning user.
#[derive(Debug, Clone, Serialize)]
pub struct AccessKeyDetails {
    pub username: String,
    pub hashed_password: String,
    pub is_admin: bool,
    pub max_requests: u64,
    /// The owning user's global counter.
    pub global_counter: u64,
    /// The key's own counter.
    pub key_counter: u64,
}

/// Result of a successful admission check.
#[derive(Debug, Clone)]
pub struct Admission {
    pub username: String,
    pub account_type: AccountType,
}

/// Capability contract for the credential & quota authority.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a user with a freshly hashed password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::PasswordTooLong`] past the hashing primitive's
    /// input limit and [`AuthError::DuplicateUser`] on an existing username.
    async fn add_user(&self, user: NewUser) -> Result<(), AuthError>;

    /// Deletes the user and all of its access keys as one atomic unit.
    /// Removing an absent user is not an error.
    async fn remove_user(&self, username: &str) -> Result<(), AuthError>;

    /// Rewrites the admin flag, quota ceiling and account type; re-hashes
    /// the password only when a non-empty one is supplied.
    async fn update_user(&self, update: UserUpdate) -> Result<(), AuthError>;

    /// Registers a normalized key for an existing user. Keys are globally
    /// unique across all users. Trusted-caller contract: no password check.
    async fn add_key(&self, username: &str, key: &str) -> Result<(), AuthError>;

    /// Deletes the key only when it belongs to `username`; a key owned by a
    /// different user, or an unknown key, is silently a no-op.
    async fn remove_key(&self, username: &str, key: &str) -> Result<(), AuthError>;

    /// The hot path: authenticates the key and, if the owner is below its
    /// quota ceiling, increments both usage counters. Check and increment
    /// are indivisible with respect to concurrent admissions on the same
    /// key or user.
    async fn is_key_allowed(&self, key: &str) -> Result<Admission, AuthError>;

    /// Verifies a username/password pair. Read-only; counters untouched.
    async fn check_user_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserDetails, AuthError>;

    /// Returns all keys and their details; an empty filter returns every key
    /// system-wide.
    async fn get_all_keys(
        &self,
        username_filter: &str,
    ) -> Result<HashMap<String, AccessKeyDetails>, AuthError>;

    /// Returns all users and their details.
    async fn get_all_users(&self) -> Result<HashMap<String, UserDetails>, AuthError>;

    /// Consumes a non-empty activation token and marks the matching user
    /// active.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidActivationToken`] when the token is
    /// empty, unknown or already consumed.
    async fn activate_user(&self, token: &str) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_normalizes_case_insensitively() {
        assert_eq!(AccountType::parse("premium"), AccountType::Premium);
        assert_eq!(AccountType::parse("PREMIUM"), AccountType::Premium);
        assert_eq!(AccountType::parse("PrEmIuM"), AccountType::Premium);
        assert_eq!(AccountType::parse("free"), AccountType::Free);
        assert_eq!(AccountType::parse("gold"), AccountType::Free);
        assert_eq!(AccountType::parse(""), AccountType::Free);
    }

    #[test]
    fn account_type_display_matches_stored_form() {
        assert_eq!(AccountType::Premium.to_string(), "premium");
        assert_eq!(AccountType::Free.to_string(), "free");
    }
}
