/// Authentication Routes
///
/// Thin adapters over `AuthService`: decode the request, call the service,
/// encode the result. Every error goes out through `AuthError`'s
/// `ResponseError` impl.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, AuthService, TokenPair};
use crate::error::{AuthError, UnauthorizedReason};
use crate::middleware::bearer_token;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn new(pair: TokenPair, auth: &AuthService) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: auth.issuer().ttl().num_seconds(),
        }
    }
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub id: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub expires_at: String,
}

/// POST /auth/signup
///
/// # Errors
/// - 400: malformed email
/// - 409: email already registered
pub async fn signup(
    form: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let user = auth.sign_up(&form.email, &form.password).await?;

    Ok(HttpResponse::Created().json(SignupResponse {
        id: user.id.to_string(),
        email: user.email,
    }))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    form: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let pair = auth.login(&form.email, &form.password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::new(pair, &auth)))
}

/// POST /auth/refresh
///
/// Takes the current access token in the `Authorization` header (an expired
/// one is accepted, a forged one is not) and the refresh token in the body.
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let token = bearer_token(req.headers())
        .ok_or(AuthError::Unauthorized(UnauthorizedReason::AccessTokenMissing))?;
    let old_access = auth.issuer().verify_signature(token)?;

    let pair = auth.refresh_token(&old_access, &form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::new(pair, &auth)))
}

/// POST /api/logout
pub async fn logout(
    claims: web::ReqData<AccessClaims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    auth.logout(&claims).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/me
pub async fn me(claims: web::ReqData<AccessClaims>) -> Result<HttpResponse, AuthError> {
    let user_id = claims.user_id()?;

    Ok(HttpResponse::Ok().json(MeResponse {
        user_id: user_id.to_string(),
        expires_at: claims.expires_at().to_rfc3339(),
    }))
}
