use crate::{
    error::{AppError, Result},
    state::AppState,
};
use axum::{
    extract::State,
    headers::{authorization::Bearer, Authorization},
    response::{Json, Redirect},
    routing::{get, post},
    Router, TypedHeader,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/signin", get(sign_in))
        .route("/session", post(report_session))
        .route("/signout", post(sign_out))
}

/// Current authentication status for a bearer token.
/// GET /api/auth/me
async fn get_current_user(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<Value>> {
    debug!("Checking authentication status");

    let user = match bearer {
        Some(TypedHeader(Authorization(bearer))) => {
            state.identity_service.get_current_user(bearer.token()).await?
        }
        None => None,
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "authenticated": user.is_some(),
            "user": user,
        }
    })))
}

/// Redirect to the external identity widget. All credential handling and
/// token exchange happen at the provider.
/// GET /api/auth/signin
async fn sign_in(State(state): State<Arc<AppState>>) -> Redirect {
    let url = state.identity_service.authorize_url();
    debug!("Redirecting to identity provider: {}", url);
    Redirect::to(&url)
}

#[derive(Debug, Deserialize)]
struct ReportSessionRequest {
    access_token: String,
}

/// The callback page reports the token it received from the provider's
/// redirect. The token is verified with the provider before local views are
/// notified of the sign-in.
/// POST /api/auth/session
async fn report_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReportSessionRequest>,
) -> Result<Json<Value>> {
    let session = state
        .identity_service
        .get_current_session(&payload.access_token)
        .await?
        .ok_or_else(|| AppError::unauthorized("Identity provider rejected the token"))?;

    state.identity_service.notify_signed_in(session.clone());

    Ok(Json(json!({
        "success": true,
        "data": { "user": session.user }
    })))
}

/// Invalidate the session at the provider.
/// POST /api/auth/signout
async fn sign_out(
    State(state): State<Arc<AppState>>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>> {
    let session = state
        .identity_service
        .get_current_session(bearer.token())
        .await?;

    match session {
        Some(session) => {
            state.identity_service.sign_out(&session).await?;
            Ok(Json(json!({
                "success": true,
                "message": "Signed out successfully"
            })))
        }
        None => {
            // Token already invalid; nothing to revoke.
            Ok(Json(json!({
                "success": true,
                "message": "No active session"
            })))
        }
    }
}
