use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::{AppConfig, JwtConfig};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Connects the pool and wires the services. The pool is returned as well
    /// so `main` can run migrations on it.
    pub async fn init(config: &AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.database.connect_options()?)
            .await
            .context("connect to database")?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        Ok((Self::from_parts(&config.jwt, users)?, db))
    }

    pub fn from_parts(jwt: &JwtConfig, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let auth = AuthService::new(users.clone(), JwtKeys::from_config(jwt))
            .context("build auth service")?;
        Ok(Self {
            users,
            auth: Arc::new(auth),
        })
    }

    #[cfg(test)]
    pub fn fake() -> (Self, Arc<crate::auth::memory::MemoryUserStore>) {
        use crate::auth::memory::MemoryUserStore;

        let store = Arc::new(MemoryUserStore::new());
        let jwt = JwtConfig {
            secret: "test".into(),
            ttl_minutes: 5,
        };
        let state =
            Self::from_parts(&jwt, store.clone() as Arc<dyn UserStore>).expect("fake state");
        (state, store)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth.keys().clone()
    }
}
