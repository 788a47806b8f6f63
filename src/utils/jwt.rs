// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

pub const HOST_ROLE: &str = "host";
pub const PARTICIPANT_ROLE: &str = "participant";

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the host id for hosts, the nickname for participants.
    pub sub: String,
    /// Either 'host' or 'participant'.
    pub role: String,
    /// The quiz a participant token was issued for. Absent on host tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<i64>,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    /// The authenticated host id. Fails unless the token carries the host role.
    pub fn host_id(&self) -> Result<i64, AppError> {
        if self.role != HOST_ROLE {
            return Err(AppError::Unauthorized("Host token required".to_string()));
        }
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError("Malformed host token".to_string()))
    }

    /// The quiz a participant token belongs to.
    pub fn participant_quiz(&self) -> Result<i64, AppError> {
        if self.role != PARTICIPANT_ROLE {
            return Err(AppError::Unauthorized(
                "Participant token required".to_string(),
            ));
        }
        self.quiz
            .ok_or(AppError::AuthError("Malformed participant token".to_string()))
    }
}

/// The raw bearer token of an authenticated request.
/// Participants are matched against the token they were issued on join.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Signs a new JWT.
///
/// Arguments:
/// * `subject`: Host id or participant nickname.
/// * `role`: `HOST_ROLE` or `PARTICIPANT_ROLE`.
/// * `quiz`: The quiz a participant token is scoped to.
pub fn sign_jwt(
    subject: &str,
    role: &str,
    quiz: Option<i64>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: subject.to_owned(),
        role: role.to_owned(),
        quiz,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Issues the opaque credential a participant receives on join.
pub trait CredentialService: Send + Sync {
    fn issue_participant_token(&self, quiz_id: i64, nickname: &str) -> Result<String, AppError>;
}

/// HS256 credentials signed with the configured secret.
#[derive(Debug, Clone)]
pub struct JwtCredentials {
    secret: String,
    expiration: u64,
}

impl JwtCredentials {
    pub fn new(secret: impl Into<String>, expiration: u64) -> Self {
        Self {
            secret: secret.into(),
            expiration,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.jwt_secret.clone(), config.jwt_expiration)
    }

    /// Host tokens come from the account system; this is used by tooling and tests.
    pub fn issue_host_token(&self, host_id: i64) -> Result<String, AppError> {
        sign_jwt(
            &host_id.to_string(),
            HOST_ROLE,
            None,
            &self.secret,
            self.expiration,
        )
    }
}

impl CredentialService for JwtCredentials {
    fn issue_participant_token(&self, quiz_id: i64, nickname: &str) -> Result<String, AppError> {
        sign_jwt(
            nickname,
            PARTICIPANT_ROLE,
            Some(quiz_id),
            &self.secret,
            self.expiration,
        )
    }
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` and the `BearerToken` into the request extensions
/// for handlers to use.
/// If invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => header[7..].to_string(),
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_jwt(&token, &config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            req.extensions_mut().insert(BearerToken(token));
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: Host Authorization.
///
/// Must be used AFTER `auth_middleware`. Rejects anything but a host token with 403.
pub async fn host_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_role(&req, HOST_ROLE)?;
    Ok(next.run(req).await)
}

/// Axum Middleware: Participant Authorization.
///
/// Must be used AFTER `auth_middleware`.
pub async fn participant_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    require_role(&req, PARTICIPANT_ROLE)?;
    Ok(next.run(req).await)
}

fn require_role(req: &Request<Body>, role: &str) -> Result<(), StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if claims.role != role {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}
