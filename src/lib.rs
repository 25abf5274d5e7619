pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod state;
