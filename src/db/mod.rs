use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tracing::info;

use crate::services::auth_service::{
    AccessKeyDetails, Admission, AuthError, NewUser, UserDetails, UserUpdate,
};

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let path_str = db_url.trim_start_matches("sqlite:");
        if !path_str.starts_with(":memory:") {
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    /// One round trip to the database, used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn key_repo(&self) -> repositories::access_key::AccessKeyRepository {
        repositories::access_key::AccessKeyRepository::new(self.conn.clone())
    }

    pub async fn add_user(&self, user: NewUser) -> Result<(), AuthError> {
        self.user_repo().add(user).await
    }

    pub async fn remove_user(&self, username: &str) -> Result<(), AuthError> {
        self.user_repo().remove(username).await
    }

    pub async fn update_user(&self, update: UserUpdate) -> Result<(), AuthError> {
        self.user_repo().update(update).await
    }

    pub async fn check_user_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserDetails, AuthError> {
        self.user_repo().check_credentials(username, password).await
    }

    pub async fn get_all_users(&self) -> Result<HashMap<String, UserDetails>, AuthError> {
        self.user_repo().get_all().await
    }

    pub async fn activate_user(&self, token: &str) -> Result<(), AuthError> {
        self.user_repo().activate(token).await
    }

    pub async fn add_key(&self, username: &str, key: &str) -> Result<(), AuthError> {
        self.key_repo().add(username, key).await
    }

    pub async fn remove_key(&self, username: &str, key: &str) -> Result<(), AuthError> {
        self.key_repo().remove(username, key).await
    }

    pub async fn is_key_allowed(&self, key: &str) -> Result<Admission, AuthError> {
        self.key_repo().is_allowed(key).await
    }

    pub async fn get_all_keys(
        &self,
        username_filter: &str,
    ) -> Result<HashMap<String, AccessKeyDetails>, AuthError> {
        self.key_repo().get_all(username_filter).await
    }
}
