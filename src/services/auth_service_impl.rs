use std::collections::HashMap;

use crate::db::Store;

use super::auth_service::{
    AccessKeyDetails, Admission, AuthError, AuthService, NewUser, UserDetails, UserUpdate,
};

/// [`AuthService`] backed by the SQLite store.
pub struct SeaOrmAuthService {
    store: Store,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl AuthService for SeaOrmAuthService {
    async fn add_user(&self, user: NewUser) -> Result<(), AuthError> {
        self.store.add_user(user).await
    }

    async fn remove_user(&self, username: &str) -> Result<(), AuthError> {
        self.store.remove_user(username).await
    }

    async fn update_user(&self, update: UserUpdate) -> Result<(), AuthError> {
        self.store.update_user(update).await
    }

    async fn add_key(&self, username: &str, key: &str) -> Result<(), AuthError> {
        self.store.add_key(username, key).await
    }

    async fn remove_key(&self, username: &str, key: &str) -> Result<(), AuthError> {
        self.store.remove_key(username, key).await
    }

    async fn is_key_allowed(&self, key: &str) -> Result<Admission, AuthError> {
        self.store.is_key_allowed(key).await
    }

    async fn check_user_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserDetails, AuthError> {
        self.store.check_user_credentials(username, password).await
    }

    async fn get_all_keys(
        &self,
        username_filter: &str,
    ) -> Result<HashMap<String, AccessKeyDetails>, AuthError> {
        self.store.get_all_keys(username_filter).await
    }

    async fn get_all_users(&self) -> Result<HashMap<String, UserDetails>, AuthError> {
        self.store.get_all_users().await
    }

    async fn activate_user(&self, token: &str) -> Result<(), AuthError> {
        self.store.activate_user(token).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::auth_service::AccountType;

    // Pool of one connection: separate connections to sqlite::memory: would
    // each get their own empty database.
    async fn service() -> SeaOrmAuthService {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        SeaOrmAuthService::new(store)
    }

    // File-backed variant so several pooled connections share one database,
    // the shape the production pool runs with.
    async fn file_backed_service(tag: &str) -> (SeaOrmAuthService, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "epochgate-{tag}-{}.db",
            crate::common::generate_key()
        ));
        let url = format!("sqlite:{}", path.display());
        let store = Store::with_pool_options(&url, 5, 5).await.unwrap();
        (SeaOrmAuthService::new(store), path)
    }

    fn user(username: &str, max_requests: u64) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "correct-horse".to_string(),
            is_admin: false,
            max_requests,
            account_type: "free".to_string(),
            is_active: true,
            activation_token: String::new(),
        }
    }

    #[tokio::test]
    async fn add_and_list_users() {
        let svc = service().await;
        svc.add_user(user("alice", 10)).await.unwrap();
        svc.add_user(user("bob", 0)).await.unwrap();

        let users = svc.get_all_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["alice"].max_requests, 10);
        assert_eq!(users["bob"].max_requests, 0);
        assert_eq!(users["alice"].request_count, 0);
        assert!(users["alice"].is_active);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let svc = service().await;
        svc.add_user(user("alice", 10)).await.unwrap();
        assert!(matches!(
            svc.add_user(user("alice", 99)).await,
            Err(AuthError::DuplicateUser)
        ));
    }

    #[tokio::test]
    async fn over_long_password_is_rejected_before_storage() {
        let svc = service().await;
        let mut new_user = user("alice", 10);
        new_user.password = "x".repeat(73);
        assert!(matches!(
            svc.add_user(new_user).await,
            Err(AuthError::PasswordTooLong(72))
        ));
        assert!(svc.get_all_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn credentials_check_verifies_the_stored_hash() {
        let svc = service().await;
        svc.add_user(user("alice", 10)).await.unwrap();

        let details = svc
            .check_user_credentials("alice", "correct-horse")
            .await
            .unwrap();
        assert_eq!(details.username, "alice");
        assert_eq!(details.account_type, AccountType::Free);
        assert_ne!(details.hashed_password, "correct-horse");

        assert!(matches!(
            svc.check_user_credentials("alice", "battery-staple").await,
            Err(AuthError::InvalidPassword)
        ));
        assert!(matches!(
            svc.check_user_credentials("nobody", "correct-horse").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn keys_are_stored_normalized() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_key("alice", "  MyKey-123 \t").await.unwrap();

        // Any spelling that normalizes to the same key works.
        svc.is_key_allowed("mykey-123").await.unwrap();
        svc.is_key_allowed("MYKEY-123\n").await.unwrap();

        assert!(matches!(
            svc.add_key("alice", "MyKey-123").await,
            Err(AuthError::DuplicateKey)
        ));
    }

    #[tokio::test]
    async fn keys_are_globally_unique_across_users() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_user(user("bob", 0)).await.unwrap();
        svc.add_key("alice", "shared-key").await.unwrap();

        assert!(matches!(
            svc.add_key("bob", "shared-key").await,
            Err(AuthError::DuplicateKey)
        ));
    }

    #[tokio::test]
    async fn empty_key_is_rejected_everywhere() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();

        assert!(matches!(
            svc.add_key("alice", "  \t\r\n ").await,
            Err(AuthError::EmptyKey)
        ));
        assert!(matches!(
            svc.is_key_allowed("").await,
            Err(AuthError::EmptyKey)
        ));
        assert!(matches!(
            svc.remove_key("alice", "").await,
            Err(AuthError::EmptyKey)
        ));
    }

    #[tokio::test]
    async fn key_for_unknown_user_is_rejected() {
        let svc = service().await;
        assert!(matches!(
            svc.add_key("nobody", "some-key").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_key_is_not_admitted() {
        let svc = service().await;
        assert!(matches!(
            svc.is_key_allowed("never-registered").await,
            Err(AuthError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn quota_admits_exactly_the_configured_number() {
        let svc = service().await;
        svc.add_user(user("alice", 3)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();
        svc.add_key("alice", "key-b").await.unwrap();

        // The quota is per user, shared across both keys.
        svc.is_key_allowed("key-a").await.unwrap();
        svc.is_key_allowed("key-b").await.unwrap();
        svc.is_key_allowed("key-a").await.unwrap();

        match svc.is_key_allowed("key-b").await {
            Err(AuthError::QuotaExceeded {
                max_requests,
                request_count,
            }) => {
                assert_eq!(max_requests, 3);
                assert_eq!(request_count, 3);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }

        // A rejected admission must not advance any counter.
        let keys = svc.get_all_keys("alice").await.unwrap();
        assert_eq!(keys["key-a"].global_counter, 3);
        assert_eq!(keys["key-a"].key_counter, 2);
        assert_eq!(keys["key-b"].key_counter, 1);
    }

    #[tokio::test]
    async fn zero_quota_means_unlimited() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        for _ in 0..5000 {
            svc.is_key_allowed("key-a").await.unwrap();
        }

        let keys = svc.get_all_keys("").await.unwrap();
        assert_eq!(keys["key-a"].global_counter, 5000);
        assert_eq!(keys["key-a"].key_counter, 5000);
    }

    #[tokio::test]
    async fn admission_reports_the_owner() {
        let svc = service().await;
        let mut premium = user("alice", 0);
        premium.account_type = "Premium".to_string();
        svc.add_user(premium).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        let admission = svc.is_key_allowed("key-a").await.unwrap();
        assert_eq!(admission.username, "alice");
        assert_eq!(admission.account_type, AccountType::Premium);
    }

    #[tokio::test]
    async fn concurrent_admissions_never_exceed_the_quota() {
        let svc = Arc::new(service().await);
        svc.add_user(user("alice", 4)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(
                async move { svc.is_key_allowed("key-a").await },
            ));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AuthError::QuotaExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(admitted, 4);
        assert_eq!(rejected, 6);

        let users = svc.get_all_users().await.unwrap();
        assert_eq!(users["alice"].request_count, 4);
    }

    #[tokio::test]
    async fn pooled_connections_never_fail_valid_admissions() {
        let (svc, path) = file_backed_service("pooled").await;
        let svc = Arc::new(svc);
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(
                async move { svc.is_key_allowed("key-a").await },
            ));
        }

        // On an unlimited account every concurrent admission must go
        // through; writer contention across pool connections must never
        // surface as a storage error.
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let users = svc.get_all_users().await.unwrap();
        assert_eq!(users["alice"].request_count, 50);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn pooled_connections_admit_exactly_the_quota() {
        let (svc, path) = file_backed_service("pooled-quota").await;
        let svc = Arc::new(svc);
        svc.add_user(user("alice", 30)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(
                async move { svc.is_key_allowed("key-a").await },
            ));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AuthError::QuotaExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(admitted, 30);
        assert_eq!(rejected, 20);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn quota_past_the_storage_range_is_rejected() {
        let svc = service().await;
        assert!(matches!(
            svc.add_user(user("alice", u64::MAX)).await,
            Err(AuthError::QuotaOutOfRange(u64::MAX))
        ));
        assert!(svc.get_all_users().await.unwrap().is_empty());

        svc.add_user(user("alice", 1)).await.unwrap();
        assert!(matches!(
            svc.update_user(UserUpdate {
                username: "alice".to_string(),
                password: String::new(),
                is_admin: false,
                max_requests: u64::MAX,
                account_type: "free".to_string(),
            })
            .await,
            Err(AuthError::QuotaOutOfRange(_))
        ));
        assert_eq!(svc.get_all_users().await.unwrap()["alice"].max_requests, 1);
    }

    #[tokio::test]
    async fn removing_a_user_removes_its_keys() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();
        svc.add_key("alice", "key-b").await.unwrap();

        svc.remove_user("alice").await.unwrap();

        assert!(svc.get_all_users().await.unwrap().is_empty());
        assert!(svc.get_all_keys("").await.unwrap().is_empty());
        assert!(matches!(
            svc.is_key_allowed("key-a").await,
            Err(AuthError::KeyNotFound)
        ));
        assert!(matches!(
            svc.check_user_credentials("alice", "correct-horse").await,
            Err(AuthError::UserNotFound)
        ));

        // Removing again is a no-op, not an error.
        svc.remove_user("alice").await.unwrap();
    }

    #[tokio::test]
    async fn remove_key_only_affects_the_owner() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();
        svc.add_user(user("bob", 0)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();

        // Wrong owner: silent no-op, the key survives.
        svc.remove_key("bob", "key-a").await.unwrap();
        svc.is_key_allowed("key-a").await.unwrap();

        svc.remove_key("alice", "key-a").await.unwrap();
        assert!(matches!(
            svc.is_key_allowed("key-a").await,
            Err(AuthError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn update_user_rewrites_quota_and_type() {
        let svc = service().await;
        svc.add_user(user("alice", 2)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();
        svc.is_key_allowed("key-a").await.unwrap();
        svc.is_key_allowed("key-a").await.unwrap();
        assert!(matches!(
            svc.is_key_allowed("key-a").await,
            Err(AuthError::QuotaExceeded { .. })
        ));

        svc.update_user(UserUpdate {
            username: "alice".to_string(),
            password: String::new(),
            is_admin: true,
            max_requests: 10,
            account_type: "premium".to_string(),
        })
        .await
        .unwrap();

        // Raising the ceiling unblocks further admissions.
        svc.is_key_allowed("key-a").await.unwrap();

        let users = svc.get_all_users().await.unwrap();
        assert!(users["alice"].is_admin);
        assert_eq!(users["alice"].max_requests, 10);
        assert_eq!(users["alice"].account_type, AccountType::Premium);

        // Empty password in the update left the old one valid.
        svc.check_user_credentials("alice", "correct-horse")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_user_can_rotate_the_password() {
        let svc = service().await;
        svc.add_user(user("alice", 0)).await.unwrap();

        svc.update_user(UserUpdate {
            username: "alice".to_string(),
            password: "new-secret".to_string(),
            is_admin: false,
            max_requests: 0,
            account_type: "free".to_string(),
        })
        .await
        .unwrap();

        svc.check_user_credentials("alice", "new-secret")
            .await
            .unwrap();
        assert!(matches!(
            svc.check_user_credentials("alice", "correct-horse").await,
            Err(AuthError::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn update_of_unknown_user_fails() {
        let svc = service().await;
        assert!(matches!(
            svc.update_user(UserUpdate {
                username: "nobody".to_string(),
                password: String::new(),
                is_admin: false,
                max_requests: 0,
                account_type: "free".to_string(),
            })
            .await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn activation_token_is_single_use() {
        let svc = service().await;
        let mut pending = user("alice", 0);
        pending.is_active = false;
        pending.activation_token = "tok-123".to_string();
        svc.add_user(pending).await.unwrap();

        assert!(!svc.get_all_users().await.unwrap()["alice"].is_active);

        svc.activate_user("tok-123").await.unwrap();
        assert!(svc.get_all_users().await.unwrap()["alice"].is_active);

        // The token was consumed and cannot be replayed.
        assert!(matches!(
            svc.activate_user("tok-123").await,
            Err(AuthError::InvalidActivationToken)
        ));
        assert!(matches!(
            svc.activate_user("").await,
            Err(AuthError::InvalidActivationToken)
        ));
        assert!(matches!(
            svc.activate_user("never-issued").await,
            Err(AuthError::InvalidActivationToken)
        ));
    }

    #[tokio::test]
    async fn consumed_tokens_do_not_collide() {
        let svc = service().await;
        let mut first = user("alice", 0);
        first.is_active = false;
        first.activation_token = "tok-a".to_string();
        svc.add_user(first).await.unwrap();
        svc.activate_user("tok-a").await.unwrap();

        // A second user with an already-blank token must not trip the
        // uniqueness rule on pending tokens.
        let mut second = user("bob", 0);
        second.is_active = false;
        second.activation_token = "tok-b".to_string();
        svc.add_user(second).await.unwrap();
        svc.activate_user("tok-b").await.unwrap();
    }

    #[tokio::test]
    async fn pending_activation_tokens_must_be_unique() {
        let svc = service().await;
        let mut first = user("alice", 0);
        first.is_active = false;
        first.activation_token = "tok-shared".to_string();
        svc.add_user(first).await.unwrap();

        // A token collision is reported as such, not as a taken username.
        let mut second = user("bob", 0);
        second.is_active = false;
        second.activation_token = "tok-shared".to_string();
        assert!(matches!(
            svc.add_user(second).await,
            Err(AuthError::DuplicateActivationToken)
        ));

        let mut retry = user("bob", 0);
        retry.is_active = false;
        retry.activation_token = "tok-fresh".to_string();
        svc.add_user(retry).await.unwrap();
    }

    #[tokio::test]
    async fn key_listing_honors_the_username_filter() {
        let svc = service().await;
        svc.add_user(user("alice", 7)).await.unwrap();
        svc.add_user(user("bob", 0)).await.unwrap();
        svc.add_key("alice", "key-a").await.unwrap();
        svc.add_key("bob", "key-b").await.unwrap();

        let all = svc.get_all_keys("").await.unwrap();
        assert_eq!(all.len(), 2);

        let alices = svc.get_all_keys("alice").await.unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices["key-a"].username, "alice");
        assert_eq!(alices["key-a"].max_requests, 7);

        assert!(svc.get_all_keys("nobody").await.unwrap().is_empty());
    }
}
