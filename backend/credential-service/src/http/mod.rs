/// HTTP API for credential-service
///
/// Every endpoint is registered explicitly in `build_router`. Handlers read
/// a flat parameter map (JSON body, form body or query string) plus the
/// bearer token, call `AuthService`, and map the result to a status code.
mod params;

pub use params::RequestParams;

use crate::error::{CredentialError, ErrorKind};
use crate::services::{AuthService, Envelope, LookupQuery};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

/// Build the HTTP router with all endpoints
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/verify", get(verify).post(verify))
        .route("/resendverification", post(resend_verification))
        .route("/requestpasswordreset", post(request_password_reset))
        .route("/resetpassword", post(reset_password))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/isloggedin", post(is_logged_in))
        .route("/userexists", post(user_exists))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn not_found() -> Response {
    reply(StatusCode::NOT_FOUND, Envelope::failed("Endpoint not found"))
}

fn reply(status: StatusCode, envelope: Envelope) -> Response {
    (status, Json(envelope)).into_response()
}

/// Map an error to a status: internal failures are 500 with a generic body,
/// an unverified bearer is 403, everything else uses `business_status`.
fn failure(err: CredentialError, business_status: StatusCode) -> Response {
    let status = match err.kind() {
        ErrorKind::Storage | ErrorKind::Migration | ErrorKind::Internal => {
            error!(error = %err, "Request failed with internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ if matches!(err, CredentialError::EmailNotVerified) => StatusCode::FORBIDDEN,
        _ => business_status,
    };
    reply(status, Envelope::from(&err))
}

async fn run<T, F>(ok: StatusCode, err: StatusCode, op: F) -> Response
where
    F: Future<Output = crate::error::Result<T>>,
    T: Into<Envelope>,
{
    match op.await {
        Ok(outcome) => reply(ok, outcome.into()),
        Err(e) => failure(e, err),
    }
}

async fn signup(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["username", "password", "email", "phone"]) {
        return resp;
    }

    run(
        StatusCode::CREATED,
        StatusCode::BAD_REQUEST,
        state.auth.signup(
            params.get("username"),
            params.get("password"),
            params.get("email"),
            params.get("phone"),
        ),
    )
    .await
}

async fn login(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["username", "password"]) {
        return resp;
    }

    run(
        StatusCode::OK,
        StatusCode::UNAUTHORIZED,
        state
            .auth
            .login(params.get("username"), params.get("password")),
    )
    .await
}

async fn verify(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["token"]) {
        return resp;
    }

    run(
        StatusCode::OK,
        StatusCode::BAD_REQUEST,
        state.auth.verify_email(params.get("token")),
    )
    .await
}

async fn resend_verification(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["email"]) {
        return resp;
    }

    match state.auth.resend_verification(params.get("email")).await {
        Ok(dispatch) => reply(StatusCode::OK, Envelope::verification_resent(dispatch)),
        Err(e) => failure(e, StatusCode::BAD_REQUEST),
    }
}

async fn request_password_reset(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["email"]) {
        return resp;
    }

    match state.auth.request_password_reset(params.get("email")).await {
        Ok(dispatch) => reply(StatusCode::OK, Envelope::reset_requested(dispatch)),
        Err(e) => failure(e, StatusCode::BAD_REQUEST),
    }
}

async fn reset_password(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["token", "password"]) {
        return resp;
    }

    run(
        StatusCode::OK,
        StatusCode::BAD_REQUEST,
        state
            .auth
            .reset_password(params.get("token"), params.get("password")),
    )
    .await
}

async fn refresh(State(state): State<AppState>, params: RequestParams) -> Response {
    if let Err(resp) = params.require(&["refresh_token"]) {
        return resp;
    }

    match state.auth.refresh(params.get("refresh_token")).await {
        Ok(session) => reply(StatusCode::OK, Envelope::refreshed(&session)),
        Err(e) => failure(e, StatusCode::UNAUTHORIZED),
    }
}

/// Requires a bearer but not a live one: expired sessions can still be invalidated
async fn logout(State(state): State<AppState>, params: RequestParams) -> Response {
    let Some(token) = params.bearer() else {
        return failure(CredentialError::MissingBearerToken, StatusCode::UNAUTHORIZED);
    };

    match state.auth.logout(token).await {
        Ok(()) => reply(StatusCode::OK, Envelope::logged_out()),
        Err(e) => failure(e, StatusCode::UNAUTHORIZED),
    }
}

async fn is_logged_in(State(state): State<AppState>, params: RequestParams) -> Response {
    match state.auth.is_logged_in(params.bearer()).await {
        Ok(status) => {
            let envelope = Envelope::from(status);
            let code = if envelope.is_success() {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            reply(code, envelope)
        }
        Err(e) => failure(e, StatusCode::UNAUTHORIZED),
    }
}

async fn user_exists(State(state): State<AppState>, params: RequestParams) -> Response {
    let query = LookupQuery {
        username: params.get_opt("username"),
        email: params.get_opt("email"),
        phone: params.get_opt("phone"),
    };

    match state.auth.lookup_user(&query).await {
        Ok(lookup) => reply(StatusCode::OK, lookup.into()),
        Err(e @ CredentialError::Validation(_)) => failure(e, StatusCode::BAD_REQUEST),
        Err(e) => failure(e, StatusCode::NOT_FOUND),
    }
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn serve<F>(router: Router, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting HTTP API server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
