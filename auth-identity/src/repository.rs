use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{error::*, models::*};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_username(&self, username: &str, case_insensitive: bool) -> Result<Option<LocalUser>>;
    async fn default_user_permissions(&self) -> Result<HashSet<String>>;
    async fn valid_auth_tokens(&self, user: &LocalUser, role: TokenRole) -> Result<Vec<String>>;
    async fn update_password_hash(&self, username: &str, password_hash: &str) -> Result<()>;
    async fn groups_of(&self, username: &str) -> Result<Vec<UserGroup>>;
    /// Open a unit of work for user and group changes.
    async fn begin(&self) -> Result<Box<dyn UserTransaction>>;
}

/// Changes staged inside a transaction are visible to later calls on the same
/// transaction and become visible to everyone else only after `commit`.
/// Dropping a transaction discards its changes.
#[async_trait]
pub trait UserTransaction: Send {
    async fn create_or_update(&mut self, params: UserParams, allow_to_create: bool) -> Result<LocalUser>;

    /// Make `user`'s membership in groups owned by `owner` match `groups`.
    ///
    /// The user leaves owned groups not listed, joins owned groups that are
    /// listed, and missing groups are created as owned by `owner`. Groups
    /// without an owner, or owned by another plugin, are left untouched.
    async fn enforce_plugin_owned_groups(&mut self, user: &LocalUser, groups: &[String], owner: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<String, LocalUser>,
    groups: HashMap<String, UserGroup>,
    tokens: HashMap<String, Vec<AuthToken>>,
    default_permissions: HashSet<String>,
    next_id: u64,
}

impl Directory {
    fn find_user(&self, username: &str, case_insensitive: bool) -> Option<&LocalUser> {
        if !case_insensitive {
            return self.users.get(username);
        }
        let wanted = username.to_lowercase();
        self.users.values().find(|u| u.username.to_lowercase() == wanted)
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory user store for tests and the operator CLI.
#[derive(Clone)]
pub struct InMemoryUserRepository {
    directory: Arc<RwLock<Directory>>,
}

impl InMemoryUserRepository {
    /// An empty store holding only the anonymous account.
    pub fn new() -> Self {
        let repo = Self {
            directory: Arc::new(RwLock::new(Directory::default())),
        };
        repo.insert_user(LocalUser::new(0, DEFAULT_USER));
        repo
    }

    pub fn with_default_permissions<I, S>(self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directory.write().default_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Insert or replace a user. A zero id is replaced by a fresh one.
    pub fn insert_user(&self, mut user: LocalUser) -> LocalUser {
        let mut dir = self.directory.write();
        if user.user_id == 0 && user.username != DEFAULT_USER {
            user.user_id = dir.allocate_id();
        }
        dir.users.insert(user.username.clone(), user.clone());
        user
    }

    pub fn insert_group(&self, group: UserGroup) {
        self.directory.write().groups.insert(group.name.clone(), group);
    }

    pub fn add_auth_token(&self, username: &str, token: AuthToken) {
        self.directory
            .write()
            .tokens
            .entry(username.to_string())
            .or_default()
            .push(token);
    }

    pub fn group(&self, name: &str) -> Option<UserGroup> {
        self.directory.read().groups.get(name).cloned()
    }

    pub fn users(&self) -> Vec<LocalUser> {
        let mut users: Vec<_> = self.directory.read().users.values().cloned().collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    pub fn user_count(&self) -> usize {
        self.directory.read().users.len()
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_username(&self, username: &str, case_insensitive: bool) -> Result<Option<LocalUser>> {
        Ok(self.directory.read().find_user(username, case_insensitive).cloned())
    }

    async fn default_user_permissions(&self) -> Result<HashSet<String>> {
        Ok(self.directory.read().default_permissions.clone())
    }

    async fn valid_auth_tokens(&self, user: &LocalUser, role: TokenRole) -> Result<Vec<String>> {
        let now = Utc::now();
        let dir = self.directory.read();
        Ok(dir
            .tokens
            .get(&user.username)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|t| t.is_valid_for(role, now))
                    .map(|t| t.token.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> Result<()> {
        let mut dir = self.directory.write();
        let user = dir
            .users
            .get_mut(username)
            .ok_or_else(|| IdentityError::UserNotFound(username.to_string()))?;
        user.password_hash = password_hash.to_string();
        debug!(username = %username, "Stored upgraded password hash");
        Ok(())
    }

    async fn groups_of(&self, username: &str) -> Result<Vec<UserGroup>> {
        let mut groups: Vec<_> = self
            .directory
            .read()
            .groups
            .values()
            .filter(|g| g.members.contains(username))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn begin(&self) -> Result<Box<dyn UserTransaction>> {
        Ok(Box::new(InMemoryUserTransaction {
            directory: Arc::clone(&self.directory),
            staged_users: HashMap::new(),
            staged_groups: HashMap::new(),
        }))
    }
}

/// Transaction over [`InMemoryUserRepository`]. Staged users are keyed by
/// their stored username.
pub struct InMemoryUserTransaction {
    directory: Arc<RwLock<Directory>>,
    staged_users: HashMap<String, LocalUser>,
    staged_groups: HashMap<String, UserGroup>,
}

impl InMemoryUserTransaction {
    fn find_user(&self, username: &str) -> Option<LocalUser> {
        let wanted = username.to_lowercase();
        if let Some(user) = self
            .staged_users
            .values()
            .find(|u| u.username.to_lowercase() == wanted)
        {
            return Some(user.clone());
        }
        self.directory.read().find_user(username, true).cloned()
    }

    fn find_group(&self, name: &str) -> Option<UserGroup> {
        if let Some(group) = self.staged_groups.get(name) {
            return Some(group.clone());
        }
        self.directory.read().groups.get(name).cloned()
    }

    fn owned_groups(&self, owner: &str) -> Vec<UserGroup> {
        let mut merged: HashMap<String, UserGroup> = self
            .directory
            .read()
            .groups
            .iter()
            .filter(|(_, g)| g.is_managed_by(owner))
            .map(|(name, g)| (name.clone(), g.clone()))
            .collect();
        for (name, group) in &self.staged_groups {
            if group.is_managed_by(owner) {
                merged.insert(name.clone(), group.clone());
            } else {
                merged.remove(name);
            }
        }
        merged.into_values().collect()
    }

    fn next_user_id(&self) -> u64 {
        let dir = self.directory.read();
        let staged_max = self.staged_users.values().map(|u| u.user_id).max().unwrap_or(0);
        dir.next_id.max(staged_max) + 1
    }
}

#[async_trait]
impl UserTransaction for InMemoryUserTransaction {
    async fn create_or_update(&mut self, params: UserParams, allow_to_create: bool) -> Result<LocalUser> {
        let user = match self.find_user(&params.username) {
            Some(existing) => {
                if existing.is_default_user() {
                    return Err(IdentityError::DefaultUserImmutable);
                }
                debug!(username = %existing.username, "Updating existing user");
                LocalUser {
                    firstname: params.firstname,
                    lastname: params.lastname,
                    email: params.email,
                    password_hash: params.password_hash,
                    active: params.active,
                    admin: params.admin,
                    extern_type: Some(params.extern_type),
                    extern_name: Some(params.extern_name),
                    ..existing
                }
            }
            None => {
                if !allow_to_create {
                    return Err(IdentityError::NotAllowedToCreateUser {
                        username: params.username,
                    });
                }
                info!(username = %params.username, extern_type = %params.extern_type, "Creating new user");
                LocalUser {
                    user_id: self.next_user_id(),
                    username: params.username,
                    firstname: params.firstname,
                    lastname: params.lastname,
                    email: params.email,
                    password_hash: params.password_hash,
                    active: params.active,
                    admin: params.admin,
                    extern_type: Some(params.extern_type),
                    extern_name: Some(params.extern_name),
                }
            }
        };
        self.staged_users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn enforce_plugin_owned_groups(&mut self, user: &LocalUser, groups: &[String], owner: &str) -> Result<()> {
        let wanted: BTreeSet<&str> = groups.iter().map(String::as_str).collect();

        for mut group in self.owned_groups(owner) {
            if group.members.contains(&user.username) && !wanted.contains(group.name.as_str()) {
                debug!(username = %user.username, group = %group.name, "Removing user from plugin-owned group");
                group.members.remove(&user.username);
                self.staged_groups.insert(group.name.clone(), group);
            }
        }

        for name in wanted {
            let mut group = match self.find_group(name) {
                Some(group) => group,
                None => {
                    info!(group = %name, owner = %owner, "Creating plugin-owned user group");
                    UserGroup::managed(name, owner)
                }
            };
            if !group.is_managed_by(owner) {
                debug!(group = %name, owner = %owner, "Skipping group not owned by plugin");
                continue;
            }
            if group.members.insert(user.username.clone()) {
                debug!(username = %user.username, group = %name, "Adding user to plugin-owned group");
            }
            self.staged_groups.insert(group.name.clone(), group);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut dir = self.directory.write();
        for (username, user) in self.staged_users {
            dir.next_id = dir.next_id.max(user.user_id);
            dir.users.insert(username, user);
        }
        for (name, group) in self.staged_groups {
            dir.groups.insert(name, group);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(username: &str) -> UserParams {
        UserParams {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            firstname: "First".to_string(),
            lastname: "Last".to_string(),
            active: true,
            admin: false,
            extern_name: username.to_string(),
            extern_type: "ldap".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_store_contains_default_user() {
        let repo = InMemoryUserRepository::new();
        let user = repo.get_by_username(DEFAULT_USER, false).await.unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_case_insensitive_lookup() {
        let repo = InMemoryUserRepository::new();
        repo.insert_user(LocalUser::new(0, "Alice"));

        assert!(repo.get_by_username("alice", false).await.unwrap().is_none());
        assert!(repo.get_by_username("alice", true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_requires_permission() {
        let repo = InMemoryUserRepository::new();
        let mut tx = repo.begin().await.unwrap();

        let err = tx.create_or_update(params("bob"), false).await.unwrap_err();
        assert_eq!(err, IdentityError::NotAllowedToCreateUser { username: "bob".into() });
    }

    #[tokio::test]
    async fn test_changes_visible_only_after_commit() {
        let repo = InMemoryUserRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let created = tx.create_or_update(params("bob"), true).await.unwrap();
        assert!(created.user_id > 0);
        assert!(repo.get_by_username("bob", false).await.unwrap().is_none());

        tx.commit().await.unwrap();
        let stored = repo.get_by_username("bob", false).await.unwrap().unwrap();
        assert_eq!(stored.extern_type.as_deref(), Some("ldap"));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_changes() {
        let repo = InMemoryUserRepository::new();
        {
            let mut tx = repo.begin().await.unwrap();
            tx.create_or_update(params("bob"), true).await.unwrap();
        }
        assert!(repo.get_by_username("bob", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_stored_username_and_id() {
        let repo = InMemoryUserRepository::new();
        let existing = repo.insert_user(LocalUser::new(0, "Bob"));

        let mut tx = repo.begin().await.unwrap();
        let updated = tx.create_or_update(params("bob"), false).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(updated.user_id, existing.user_id);
        assert_eq!(updated.username, "Bob");
        assert_eq!(updated.email, "bob@example.com");
        assert_eq!(repo.user_count(), 2);
    }

    #[tokio::test]
    async fn test_default_user_is_immutable() {
        let repo = InMemoryUserRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let err = tx.create_or_update(params(DEFAULT_USER), true).await.unwrap_err();
        assert_eq!(err, IdentityError::DefaultUserImmutable);
    }

    #[tokio::test]
    async fn test_group_sync_only_touches_owned_groups() {
        let repo = InMemoryUserRepository::new();
        let user = repo.insert_user(LocalUser::new(0, "carol"));
        repo.insert_group(UserGroup::managed("old-ldap", "ldap").with_member("carol"));
        repo.insert_group(UserGroup::managed("crowd-team", "crowd").with_member("carol"));
        repo.insert_group(UserGroup::manual("local-admins").with_member("carol"));
        repo.insert_group(UserGroup::manual("developers"));

        let mut tx = repo.begin().await.unwrap();
        tx.enforce_plugin_owned_groups(&user, &["developers".into(), "new-ldap".into()], "ldap")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(!repo.group("old-ldap").unwrap().members.contains("carol"));
        assert!(repo.group("crowd-team").unwrap().members.contains("carol"));
        assert!(repo.group("local-admins").unwrap().members.contains("carol"));
        assert!(!repo.group("developers").unwrap().members.contains("carol"));

        let created = repo.group("new-ldap").unwrap();
        assert!(created.is_managed_by("ldap"));
        assert!(created.members.contains("carol"));
    }

    #[tokio::test]
    async fn test_valid_auth_tokens_filters_role() {
        let repo = InMemoryUserRepository::new();
        let user = repo.insert_user(LocalUser::new(0, "dave"));
        repo.add_auth_token("dave", AuthToken::new("vcs-token", TokenRole::Vcs));
        repo.add_auth_token("dave", AuthToken::new("api-token", TokenRole::Api));

        let tokens = repo.valid_auth_tokens(&user, TokenRole::Vcs).await.unwrap();
        assert_eq!(tokens, vec!["vcs-token".to_string()]);
    }

    #[tokio::test]
    async fn test_update_password_hash_unknown_user() {
        let repo = InMemoryUserRepository::new();
        let err = repo.update_password_hash("ghost", "h").await.unwrap_err();
        assert_eq!(err, IdentityError::UserNotFound("ghost".into()));
    }
}
