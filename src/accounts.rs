//! Account name → user resolution

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::AccountConfig;

/// Authenticated account the uploads run as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub account_name: String,
    pub display_name: String,
    /// Remote folder all of this account's uploads land under
    pub remote_root: String,
    /// Storage quota in bytes, `None` for unlimited
    pub quota_bytes: Option<u64>,
}

impl User {
    pub fn new(account_name: impl Into<String>) -> Self {
        let account_name = account_name.into();
        Self {
            display_name: account_name.clone(),
            remote_root: account_name.clone(),
            account_name,
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Found(User),
    NotFound,
}

#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, account_name: &str) -> AccountLookup;
}

/// Resolver over the `[accounts.*]` configuration tables
#[derive(Debug, Clone, Default)]
pub struct ConfigAccountResolver {
    users: HashMap<String, User>,
}

impl ConfigAccountResolver {
    pub fn new(accounts: &HashMap<String, AccountConfig>) -> Self {
        let users = accounts
            .iter()
            .map(|(name, account)| {
                let user = User {
                    account_name: name.clone(),
                    display_name: account.display_name.clone().unwrap_or_else(|| name.clone()),
                    remote_root: account.remote_root.clone().unwrap_or_else(|| name.clone()),
                    quota_bytes: account.quota.map(|q| q.as_u64()),
                };
                (name.clone(), user)
            })
            .collect();

        Self { users }
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.account_name.clone(), user);
    }

    pub fn account_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl AccountResolver for ConfigAccountResolver {
    async fn resolve(&self, account_name: &str) -> AccountLookup {
        match self.users.get(account_name) {
            Some(user) => AccountLookup::Found(user.clone()),
            None => AccountLookup::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[tokio::test]
    async fn test_resolves_configured_accounts() {
        let mut accounts = HashMap::new();
        accounts.insert(
            "alice".to_string(),
            AccountConfig {
                display_name: Some("Alice".to_string()),
                remote_root: None,
                quota: Some(ByteSize::mib(10)),
            },
        );

        let resolver = ConfigAccountResolver::new(&accounts);

        let AccountLookup::Found(user) = resolver.resolve("alice").await else {
            panic!("alice should resolve");
        };
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.remote_root, "alice");
        assert_eq!(user.quota_bytes, Some(10 * 1024 * 1024));

        assert_eq!(resolver.resolve("mallory").await, AccountLookup::NotFound);
    }

    #[tokio::test]
    async fn test_insert_and_names() {
        let mut resolver = ConfigAccountResolver::default();
        resolver.insert(User::new("bob"));
        resolver.insert(User::new("alice").with_quota(5));

        assert_eq!(resolver.account_names(), vec!["alice", "bob"]);
        assert!(matches!(
            resolver.resolve("bob").await,
            AccountLookup::Found(User { quota_bytes: None, .. })
        ));
    }
}
