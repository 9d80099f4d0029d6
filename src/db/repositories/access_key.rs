use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
    sea_query::{Expr, Query},
};

use crate::common::normalize_key;
use crate::entities::{access_keys, users};
use crate::services::auth_service::{AccessKeyDetails, AccountType, Admission, AuthError};

pub struct AccessKeyRepository {
    conn: DatabaseConnection,
}

impl AccessKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, username: &str, key: &str) -> Result<(), AuthError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(AuthError::EmptyKey);
        }

        let active = access_keys::ActiveModel {
            key: Set(key),
            username: Set(username.to_string()),
            request_count: Set(0),
        };

        active.insert(&self.conn).await.map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AuthError::DuplicateKey,
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => AuthError::UserNotFound,
            _ => AuthError::from(err),
        })?;

        Ok(())
    }

    /// Deletes the key only when it belongs to `username`; otherwise a
    /// silent no-op.
    pub async fn remove(&self, username: &str, key: &str) -> Result<(), AuthError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(AuthError::EmptyKey);
        }

        access_keys::Entity::delete_many()
            .filter(access_keys::Column::Key.eq(key))
            .filter(access_keys::Column::Username.eq(username))
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    /// Admission check: authenticate the key, enforce the owner's quota and
    /// bump both counters, all inside one transaction. The quota check is a
    /// conditional update, so two racing admissions can never both slip
    /// through the last remaining slot.
    pub async fn is_allowed(&self, key: &str) -> Result<Admission, AuthError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(AuthError::EmptyKey);
        }

        let txn = self.conn.begin().await?;

        // The conditional increment is the transaction's first statement, so
        // the write lock is taken up front and concurrent admissions queue
        // on the busy timeout instead of failing a read-to-write upgrade.
        let owner = Query::select()
            .column(access_keys::Column::Username)
            .from(access_keys::Entity)
            .and_where(Expr::col(access_keys::Column::Key).eq(key.clone()))
            .to_owned();

        let admitted = users::Entity::update_many()
            .col_expr(
                users::Column::RequestCount,
                Expr::col(users::Column::RequestCount).add(1),
            )
            .filter(users::Column::Username.in_subquery(owner))
            .filter(
                Condition::any()
                    .add(users::Column::MaxRequests.eq(0))
                    .add(
                        Expr::col(users::Column::RequestCount)
                            .lt(Expr::col(users::Column::MaxRequests)),
                    ),
            )
            .exec(&txn)
            .await?;

        let (_, user) = access_keys::Entity::find_by_id(&key)
            .find_also_related(users::Entity)
            .one(&txn)
            .await?
            .ok_or(AuthError::KeyNotFound)?;

        let user = user.ok_or_else(|| {
            AuthError::Internal(format!("access key '{key}' has no owning user"))
        })?;

        if admitted.rows_affected == 0 {
            return Err(AuthError::QuotaExceeded {
                max_requests: counter_value(user.max_requests),
                request_count: counter_value(user.request_count),
            });
        }

        access_keys::Entity::update_many()
            .col_expr(
                access_keys::Column::RequestCount,
                Expr::col(access_keys::Column::RequestCount).add(1),
            )
            .filter(access_keys::Column::Key.eq(&key))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok(Admission {
            username: user.username,
            account_type: AccountType::parse(&user.account_type),
        })
    }

    /// All keys joined with their owners; an empty filter means every key.
    pub async fn get_all(
        &self,
        username_filter: &str,
    ) -> Result<HashMap<String, AccessKeyDetails>, AuthError> {
        let mut query = access_keys::Entity::find().find_also_related(users::Entity);

        if !username_filter.is_empty() {
            query = query.filter(access_keys::Column::Username.eq(username_filter));
        }

        let rows = query.all(&self.conn).await?;

        let mut keys = HashMap::with_capacity(rows.len());
        for (key, user) in rows {
            let user = user.ok_or_else(|| {
                AuthError::Internal(format!("access key '{}' has no owning user", key.key))
            })?;
            keys.insert(
                key.key,
                AccessKeyDetails {
                    username: user.username,
                    hashed_password: user.hashed_password,
                    is_admin: user.is_admin,
                    max_requests: counter_value(user.max_requests),
                    global_counter: counter_value(user.request_count),
                    key_counter: counter_value(key.request_count),
                },
            );
        }
        Ok(keys)
    }
}

/// Stored counters are never negative; a corrupted row reads as zero.
fn counter_value(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
