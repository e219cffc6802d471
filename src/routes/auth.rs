/// Authentication Routes
///
/// Sign-up, sign-in, token refresh, sign-out, password change and the
/// current member's profile. Input validation happens here; the business
/// rules live in `AuthService`.

use std::net::IpAddr;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims, ClientContext, SignUpRequest};
use crate::error::{AppError, ErrorContext};
use crate::validators::{
    is_valid_member_name, is_valid_optional_email, is_valid_password, is_valid_phone_number,
    is_valid_username,
};

#[derive(Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub member_id: i64,
}

/// User agent and client address of the request
///
/// The address is the first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the peer address. Header values that do not parse as an IP address
/// are skipped.
pub fn client_context(req: &HttpRequest) -> ClientContext {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let parse_ip = |v: &str| v.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string());

    let forwarded_for = header("X-Forwarded-For")
        .and_then(|v| v.split(',').next().and_then(parse_ip));

    let ip_address = forwarded_for
        .or_else(|| header("X-Real-IP").and_then(|v| parse_ip(&v)))
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()));

    ClientContext {
        user_agent: header("User-Agent"),
        ip_address,
    }
}

/// POST /auth/sign-up
///
/// # Errors
/// - 400: Validation errors
/// - 409: Username or email already in use
pub async fn sign_up(
    form: web::Json<SignUpRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("member_sign_up");
    let form = form.into_inner();

    let request = SignUpRequest {
        username: is_valid_username(&form.username)?,
        member_name: is_valid_member_name(&form.member_name)?,
        phone_number: is_valid_phone_number(&form.phone_number)?,
        email_address: is_valid_optional_email(form.email_address.as_deref())?,
        password: {
            is_valid_password("password", &form.password)?;
            form.password
        },
    };

    let member_id = service.sign_up(request).await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = member_id,
        "Sign-up completed"
    );

    Ok(HttpResponse::Ok().json(SignUpResponse { member_id }))
}

/// POST /auth/sign-in
///
/// # Errors
/// - 401: Unknown username or wrong password (same response for both)
/// - 423: Account suspended or deleted
pub async fn sign_in(
    req: HttpRequest,
    form: web::Json<SignInRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("member_sign_in");
    let client = client_context(&req);

    let tokens = service
        .sign_in(form.username.trim(), &form.password, &client)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = tokens.member.id,
        "Sign-in completed"
    );

    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/refresh
///
/// Rotates the refresh token: the presented token is revoked and a new pair
/// is returned.
///
/// # Errors
/// - 401: Refresh token absent, revoked, expired or already used
/// - 423: Account no longer active
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let client = client_context(&req);

    let tokens = service.refresh(&form.refresh_token, &client).await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = tokens.member.id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/sign-out
///
/// Always 200 for a well-formed body, whether or not the token was known.
pub async fn sign_out(
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.sign_out(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().finish())
}

/// POST /auth/change-password
///
/// **Requires a valid access token**; every refresh token of the member is
/// revoked on success.
///
/// # Errors
/// - 400: Validation error, current password mismatch, or unchanged password
/// - 401: Missing or invalid token (handled by middleware)
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let member_id = claims.member_id()?;
    let context = ErrorContext::new("change_password").with_member_id(member_id);

    is_valid_password("newPassword", &form.new_password)?;

    service
        .change_password(member_id, &form.current_password, &form.new_password)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = member_id,
        "Password changed"
    );

    Ok(HttpResponse::Ok().finish())
}

/// GET /auth/me
///
/// **Requires a valid access token**; claims are injected by the JWT middleware.
pub async fn me(
    claims: web::ReqData<Claims>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let member_id = claims.member_id()?;
    let profile = service.profile(member_id).await?;

    Ok(HttpResponse::Ok().json(profile))
}
