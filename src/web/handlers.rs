use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Json, Redirect},
    Extension,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiResponse, AppError, AppState};
use crate::auth::{self, Claims};
use crate::models::NewUser;
use crate::resolver::{ExtractionResult, FailureKind};

// Image resolution

#[derive(Debug, Deserialize)]
pub struct ResolveImageRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveImageResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

pub async fn resolve_product_image(
    State(state): State<AppState>,
    Json(request): Json<ResolveImageRequest>,
) -> Result<Json<ApiResponse<ResolveImageResponse>>, AppError> {
    match state.resolver.resolve(&request.url).await {
        ExtractionResult::Found(image_url) => {
            tracing::info!(url = %request.url, image_url = %image_url, "Resolved product image");
            Ok(Json(ApiResponse::success(ResolveImageResponse {
                image_url,
            })))
        }
        ExtractionResult::NotFound => {
            tracing::warn!(url = %request.url, "No strategy yielded an image");
            Err(AppError::not_found("Product image"))
        }
        ExtractionResult::Failed(FailureKind::InvalidInput) => {
            Err(AppError::bad_request("Please provide a product URL"))
        }
        ExtractionResult::Failed(kind) => {
            tracing::error!(url = %request.url, kind = ?kind, "Resolution failed");
            Err(AppError::internal("Error processing request"))
        }
    }
}

// Password auth

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageResponse>>), AppError> {
    request
        .validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let existing = state
        .users
        .find_by_email(&request.email)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user: {}", e);
            AppError::internal("Database error")
        })?;
    if existing.is_some() {
        return Err(AppError::conflict("User already exists"));
    }

    let password_hash =
        auth::hash_password(&request.password).map_err(|e| AppError::internal(e.to_string()))?;

    let user = state
        .users
        .create(NewUser {
            name: request.name,
            email: request.email,
            password_hash: Some(password_hash),
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to create user: {}", e);
            AppError::internal("Database error")
        })?;

    tracing::info!(user_id = %user.id, email = %user.email, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(MessageResponse {
            message: "User registered successfully".to_string(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let user = state
        .users
        .find_by_email(&request.email)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user: {}", e);
            AppError::internal("Database error")
        })?
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;

    // OAuth-created accounts carry no password hash.
    let password_hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;

    let matches = auth::verify_password(&request.password, password_hash)
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !matches {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let token = auth::issue_token(
        &user.id,
        &user.email,
        &state.config.security.secret_key,
        state.config.security.jwt_expiry,
    )
    .map_err(|e| AppError::internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(ApiResponse::success(LoginResponse {
        message: "Login successful".to_string(),
        token,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let user = state
        .users
        .find_by_email(&request.email)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user: {}", e);
            AppError::internal("Database error")
        })?;

    if user.is_none() {
        return Err(AppError::not_found("User"));
    }

    // Mail delivery is out of scope; acknowledge the request.
    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password reset link sent to your email".to_string(),
    })))
}

// Google OAuth

pub async fn google_auth(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let oauth = state
        .oauth
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Google sign-in is not configured"))?;

    let url = oauth
        .authorize_url()
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: String,
}

pub async fn google_auth_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Redirect, AppError> {
    let oauth = state
        .oauth
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Google sign-in is not configured"))?;

    let access_token = oauth.exchange_code(&params.code).await.map_err(|e| {
        tracing::error!("OAuth token exchange failed: {}", e);
        AppError::unauthorized("Could not complete Google sign-in")
    })?;

    let profile = oauth.fetch_profile(&access_token).await.map_err(|e| {
        tracing::error!("OAuth profile fetch failed: {}", e);
        AppError::unauthorized("Could not complete Google sign-in")
    })?;

    let user = match state.users.find_by_email(&profile.email).await.map_err(|e| {
        tracing::error!("Failed to look up user: {}", e);
        AppError::internal("Database error")
    })? {
        Some(user) => user,
        None => state
            .users
            .create(NewUser {
                name: profile.name.unwrap_or_else(|| profile.email.clone()),
                email: profile.email.clone(),
                password_hash: None,
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user from OAuth profile: {}", e);
                AppError::internal("Database error")
            })?,
    };

    let token = auth::issue_token(
        &user.id,
        &user.email,
        &state.config.security.secret_key,
        state.config.security.jwt_expiry,
    )
    .map_err(|e| AppError::internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, "User signed in via Google");
    Ok(Redirect::temporary(&format!(
        "{}?token={}",
        state.config.oauth.post_login_redirect, token
    )))
}

// Authenticated profile

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
}

pub async fn current_user(
    Extension(claims): Extension<Claims>,
) -> Json<ApiResponse<MeResponse>> {
    Json(ApiResponse::success(MeResponse {
        id: claims.sub,
        email: claims.email,
    }))
}
