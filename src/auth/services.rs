use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{
    errors::AuthError,
    jwt::JwtKeys,
    repo::{StoreError, UserStore},
    repo_types::{HashedPassword, NewUser, User},
};

/// Sign-up and sign-in flows over a [`UserStore`] and [`JwtKeys`].
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    /// Checked against when the username is unknown, so both failure paths
    /// pay for one Argon2 verification.
    decoy: HashedPassword,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys) -> anyhow::Result<Self> {
        let decoy = HashedPassword::from_plain(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self { users, keys, decoy })
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Creates a user unless the username or email is already taken. Only
    /// presence is checked: username and email must be non-empty, the
    /// password just has to be supplied.
    ///
    /// The lookup before insert is only a fast path; a unique violation from
    /// the store is reported as the same [`AuthError::Conflict`].
    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User, AuthError> {
        let (Some(username), Some(email), Some(password)) =
            (present(username), present(email), password)
        else {
            warn!("signup missing fields");
            return Err(AuthError::BadRequest(
                "Username, email and password are required",
            ));
        };

        if self
            .users
            .find_by_username_or_email(username, email)
            .await?
            .is_some()
        {
            warn!(username = %username, "user already exists");
            return Err(AuthError::Conflict);
        }

        let new_user = NewUser::new(username.to_owned(), email.to_owned(), password)?;
        match self.users.insert(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "user registered");
                Ok(user)
            }
            Err(StoreError::UniqueViolation) => {
                warn!(username = %username, "user already exists (insert conflict)");
                Err(AuthError::Conflict)
            }
            Err(StoreError::Other(e)) => Err(AuthError::Internal(e)),
        }
    }

    /// Returns a signed access token for a matching username/password pair.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, AuthError> {
        let (Some(username), Some(password)) = (present(username), present(password)) else {
            warn!("signin missing fields");
            return Err(AuthError::BadRequest("Username and password are required"));
        };

        let user = match self.users.find_by_username(username).await? {
            Some(u) if u.check_password(password) => u,
            Some(u) => {
                warn!(user_id = %u.id, "signin invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                self.decoy.verify(password);
                warn!(username = %username, "signin unknown user");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.keys.sign(user.id)?;
        info!(user_id = %user.id, "user signed in");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{jwt::test_keys, memory::MemoryUserStore};

    fn service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let svc = AuthService::new(store.clone(), test_keys("dev-secret")).expect("service");
        (svc, store)
    }

    #[tokio::test]
    async fn fresh_registration_creates_exactly_one_record() {
        let (svc, store) = service();
        let user = svc
            .register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .expect("register");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(store.count_username("alice"), 1);
        assert!(store.find_by_username("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let (svc, store) = service();
        svc.register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();
        let err = svc
            .register(Some("alice"), Some("b@x.com"), Some("pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
        assert_eq!(store.count_username("alice"), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (svc, store) = service();
        svc.register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();
        let err = svc
            .register(Some("bob"), Some("a@x.com"), Some("pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn insert_conflict_after_passing_precheck_is_conflict() {
        let store = Arc::new(MemoryUserStore::racing());
        let svc = AuthService::new(store.clone(), test_keys("dev-secret")).expect("service");
        svc.register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();
        let err = svc
            .register(Some("alice"), Some("b@x.com"), Some("pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn register_requires_all_fields() {
        let (svc, store) = service();
        let err = svc
            .register(Some("alice"), Some(""), Some("pw1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        let err = svc.register(None, Some("a@x.com"), Some("pw1")).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        let err = svc.register(Some("alice"), Some("a@x.com"), None).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        assert_eq!(store.lookups(), 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn register_accepts_empty_password() {
        let (svc, store) = service();
        let user = svc
            .register(Some("erin"), Some("e@x.com"), Some(""))
            .await
            .expect("register");
        assert!(user.check_password(""));
        assert!(!user.check_password("x"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_costs_a_password_verification() {
        let (svc, _store) = service();
        svc.register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();

        async fn fastest(svc: &AuthService, username: &str) -> std::time::Duration {
            let mut best = std::time::Duration::MAX;
            for _ in 0..3 {
                let started = std::time::Instant::now();
                let err = svc
                    .authenticate(Some(username), Some("wrong"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, AuthError::InvalidCredentials));
                best = best.min(started.elapsed());
            }
            best
        }

        let wrong_password = fastest(&svc, "alice").await;
        let unknown_user = fastest(&svc, "nobody").await;

        // Both paths run one Argon2 verification with the same parameters.
        assert!(
            unknown_user * 4 >= wrong_password,
            "unknown user {unknown_user:?} vs wrong password {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn authenticate_returns_token_for_user() {
        let (svc, _store) = service();
        let user = svc
            .register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();
        let token = svc
            .authenticate(Some("alice"), Some("pw1"))
            .await
            .expect("authenticate");
        let claims = svc.keys().verify(&token).expect("verify");
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_indistinguishable() {
        let (svc, _store) = service();
        svc.register(Some("alice"), Some("a@x.com"), Some("pw1"))
            .await
            .unwrap();

        let wrong = svc
            .authenticate(Some("alice"), Some("wrong"))
            .await
            .unwrap_err();
        let unknown = svc
            .authenticate(Some("mallory"), Some("pw1"))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.status(), unknown.status());
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn empty_password_is_bad_request_without_store_access() {
        let (svc, store) = service();
        let err = svc.authenticate(Some("alice"), Some("")).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        let err = svc.authenticate(None, Some("pw1")).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        assert_eq!(store.lookups(), 0);
    }
}
