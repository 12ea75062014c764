use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::auth::Claims;
use crate::error::ServiceError;
use crate::models::account::{LoginRequest, NewUser, TokenResponse, UserRole};
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// Claims of the `Authorization: Bearer` token on `req`.
fn bearer_claims(req: &HttpRequest, state: &AppState) -> Result<Claims, ServiceError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".into()))?;
    state.tokens.decode(token.trim())
}

fn require_admin(claims: &Claims) -> Result<(), ServiceError> {
    if claims.role == UserRole::Admin.as_str() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("administrator role required".into()))
    }
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ServiceError> {
    let store = state.accounts()?;
    let user = store.authenticate(&body.username, &body.password).await?;
    let access_token = state.tokens.issue(&user)?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: state.tokens.expires_in(),
        user,
    }))
}

pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let claims = bearer_claims(&req, &state)?;
    let stored = state
        .accounts()?
        .get_user_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| ServiceError::Unauthorized("user no longer exists".into()))?;
    Ok(HttpResponse::Ok().json(stored.user))
}

#[instrument(skip(req, state, body), fields(username = %body.username))]
pub async fn create_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<NewUser>,
) -> Result<HttpResponse, ServiceError> {
    let claims = bearer_claims(&req, &state)?;
    require_admin(&claims)?;

    let store = state.accounts()?;
    let user = store.create_user(&body).await?;
    store
        .log_audit(&claims.user_id, "create_user", Some(&user.username))
        .await?;
    info!(created_by = %claims.sub, "user account created");
    Ok(HttpResponse::Created().json(user))
}

pub async fn get_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    bearer_claims(&req, &state)?;
    let username = path.into_inner();
    let stored = state
        .accounts()?
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ServiceError::not_found("User", username))?;
    Ok(HttpResponse::Ok().json(stored.user))
}

/// A user's own trail, or anyone's for an administrator.
pub async fn audit_log(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<AuditQuery>,
) -> Result<HttpResponse, ServiceError> {
    let claims = bearer_claims(&req, &state)?;
    let user_id = path.into_inner();
    if claims.user_id != user_id {
        require_admin(&claims)?;
    }

    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    if !(1..=MAX_AUDIT_LIMIT).contains(&limit) {
        return Err(ServiceError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_AUDIT_LIMIT
        )));
    }

    let entries = state.accounts()?.get_audit_logs(&user_id, limit).await?;
    Ok(HttpResponse::Ok().json(entries))
}
