use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
    sea_query::Expr,
};
use tokio::task;

use crate::entities::{access_keys, users};
use crate::services::auth_service::{AccountType, AuthError, NewUser, UserDetails, UserUpdate};

/// Hard input limit of the bcrypt primitive.
pub const MAX_PASSWORD_LEN: usize = 72;

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, user: NewUser) -> Result<(), AuthError> {
        let hashed = hash_password_blocking(user.password).await?;

        let active = users::ActiveModel {
            username: Set(user.username),
            hashed_password: Set(hashed),
            is_admin: Set(user.is_admin),
            max_requests: Set(quota_to_storage(user.max_requests)?),
            request_count: Set(0),
            account_type: Set(AccountType::parse(&user.account_type).as_str().to_string()),
            is_active: Set(user.is_active),
            activation_token: Set(user.activation_token),
        };

        active.insert(&self.conn).await.map_err(|err| match err.sql_err() {
            // Both the username and the pending activation token are covered
            // by unique indexes; the violation message names the column.
            Some(SqlErr::UniqueConstraintViolation(msg)) => {
                if msg.contains("activation_token") {
                    AuthError::DuplicateActivationToken
                } else {
                    AuthError::DuplicateUser
                }
            }
            _ => AuthError::from(err),
        })?;

        Ok(())
    }

    /// Deletes the user together with its keys; deleting an absent user is
    /// a no-op.
    pub async fn remove(&self, username: &str) -> Result<(), AuthError> {
        let txn = self.conn.begin().await?;

        access_keys::Entity::delete_many()
            .filter(access_keys::Column::Username.eq(username))
            .exec(&txn)
            .await?;

        users::Entity::delete_many()
            .filter(users::Column::Username.eq(username))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn update(&self, update: UserUpdate) -> Result<(), AuthError> {
        let mut stmt = users::Entity::update_many()
            .col_expr(users::Column::IsAdmin, Expr::value(update.is_admin))
            .col_expr(
                users::Column::MaxRequests,
                Expr::value(quota_to_storage(update.max_requests)?),
            )
            .col_expr(
                users::Column::AccountType,
                Expr::value(AccountType::parse(&update.account_type).as_str()),
            );

        if !update.password.is_empty() {
            let hashed = hash_password_blocking(update.password).await?;
            stmt = stmt.col_expr(users::Column::HashedPassword, Expr::value(hashed));
        }

        let result = stmt
            .filter(users::Column::Username.eq(update.username))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserDetails, AuthError> {
        let user = users::Entity::find_by_id(username)
            .one(&self.conn)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password_blocking(password.to_string(), user.hashed_password.clone()).await?;

        Ok(details_from_model(user))
    }

    pub async fn get_all(&self) -> Result<HashMap<String, UserDetails>, AuthError> {
        let users = users::Entity::find().all(&self.conn).await?;
        Ok(users
            .into_iter()
            .map(|u| (u.username.clone(), details_from_model(u)))
            .collect())
    }

    /// Consumes an activation token: the matching user becomes active and
    /// the token is blanked so it cannot be replayed.
    pub async fn activate(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidActivationToken);
        }

        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActive, Expr::value(true))
            .col_expr(users::Column::ActivationToken, Expr::value(""))
            .filter(users::Column::ActivationToken.eq(token))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AuthError::InvalidActivationToken);
        }
        Ok(())
    }
}

fn details_from_model(model: users::Model) -> UserDetails {
    UserDetails {
        account_type: AccountType::parse(&model.account_type),
        username: model.username,
        hashed_password: model.hashed_password,
        is_admin: model.is_admin,
        max_requests: u64::try_from(model.max_requests).unwrap_or(0),
        request_count: u64::try_from(model.request_count).unwrap_or(0),
        is_active: model.is_active,
    }
}

/// Quotas are stored in a signed column; ceilings past its range are
/// rejected instead of wrapping negative.
fn quota_to_storage(max_requests: u64) -> Result<i64, AuthError> {
    i64::try_from(max_requests).map_err(|_| AuthError::QuotaOutOfRange(max_requests))
}

/// Hashes a password off the async runtime; bcrypt is CPU-bound.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| AuthError::Internal(format!("hashing task panicked: {err}")))?
}

pub async fn verify_password_blocking(
    password: String,
    stored_hex: String,
) -> Result<(), AuthError> {
    task::spawn_blocking(move || verify_password(&password, &stored_hex))
        .await
        .map_err(|err| AuthError::Internal(format!("verification task panicked: {err}")))?
}

/// Hashes with bcrypt and hex-encodes the digest for storage.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AuthError::PasswordTooLong(MAX_PASSWORD_LEN));
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|err| AuthError::Internal(format!("bcrypt hashing failed: {err}")))?;

    Ok(hex::encode(hash))
}

/// Checks a password against a stored hex-encoded bcrypt digest. Any
/// decoding problem counts as a failed match.
pub fn verify_password(password: &str, stored_hex: &str) -> Result<(), AuthError> {
    let bytes = hex::decode(stored_hex).map_err(|_| AuthError::InvalidPassword)?;
    let hash = String::from_utf8(bytes).map_err(|_| AuthError::InvalidPassword)?;

    let matches = bcrypt::verify(password, &hash).map_err(|_| AuthError::InvalidPassword)?;
    if matches { Ok(()) } else { Err(AuthError::InvalidPassword) }
}
