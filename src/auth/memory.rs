use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    lookups: AtomicUsize,
    /// Makes the pre-insert lookup miss, as a concurrent registration would.
    hide_on_lookup: bool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn racing() -> Self {
        Self {
            hide_on_lookup: true,
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn count_username(&self, username: &str) -> usize {
        self.users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.username == username)
            .count()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let found = self.find(|u| u.username == username || u.email == email);
        Ok(if self.hide_on_lookup { None } else { found })
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.id == id))
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::UniqueViolation);
        }
        let created = User::from_new(Uuid::new_v4(), user);
        users.push(created.clone());
        Ok(created)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_enforces_unique_username_and_email() {
        let store = MemoryUserStore::new();
        let alice = NewUser::new("alice".into(), "a@x.com".into(), "pw").unwrap();
        store.insert(alice).await.expect("first insert");

        let same_name = NewUser::new("alice".into(), "other@x.com".into(), "pw").unwrap();
        assert!(matches!(
            store.insert(same_name).await,
            Err(StoreError::UniqueViolation)
        ));

        let same_email = NewUser::new("bob".into(), "a@x.com".into(), "pw").unwrap();
        assert!(matches!(
            store.insert(same_email).await,
            Err(StoreError::UniqueViolation)
        ));

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn username_lookup_is_exact() {
        let store = MemoryUserStore::new();
        let alice = NewUser::new("alice".into(), "a@x.com".into(), "pw").unwrap();
        store.insert(alice).await.unwrap();

        assert!(store.find_by_username("alice").await.unwrap().is_some());
        assert!(store.find_by_username("Alice").await.unwrap().is_none());
        assert!(store.find_by_username("alice ").await.unwrap().is_none());
    }
}
