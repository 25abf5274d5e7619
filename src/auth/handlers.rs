use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        dto::{MessageResponse, PublicUser, SigninRequest, SignupRequest, TokenResponse},
        errors::AuthError,
        extractors::AuthUser,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// An unreadable body (absent, not JSON, `null`, wrong shape) counts as a
/// body with every field missing, so the caller gets the usual 400.
fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "unreadable request body");
            T::default()
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let payload = body_or_default(payload);
    state
        .auth
        .register(
            payload.username.as_deref(),
            payload.email.as_deref(),
            payload.password.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User Successfully Created",
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let payload = body_or_default(payload);
    let access_token = state
        .auth
        .authenticate(payload.username.as_deref(), payload.password.as_deref())
        .await?;
    Ok(Json(TokenResponse { access_token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, Json<MessageResponse>)> {
    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => Ok(Json(user.into())),
        Ok(None) => Err((
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse {
                message: "User not found",
            }),
        )),
        Err(e) => {
            error!(error = ?e, user_id = %user_id, "load user failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse {
                    message: "Internal Server Error",
                }),
            ))
        }
    }
}
