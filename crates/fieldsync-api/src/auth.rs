use std::time::Duration;

use axum::http::HeaderMap;
use fieldsync_core::{Identity, Role};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.role)
    }
}

/// Verifies HS256 access tokens signed with the shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    issuer: Option<String>,
    clock_skew: Duration,
}

impl JwtVerifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            clock_skew: config.auth_clock_skew,
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp/nbf are checked below with the configured skew
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let decoded = decode::<AccessClaims>(token, &self.key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        if decoded.claims.sub.trim().is_empty() {
            return Err(AppError::unauthorized("Token subject is missing"));
        }
        if decoded.claims.token_type.as_deref().is_some_and(|kind| kind != "access") {
            return Err(AppError::unauthorized("Token is not an access token"));
        }
        validate_temporal_claims(&decoded.claims, self.clock_skew)?;

        let role = match decoded.claims.role.as_deref() {
            None => Role::default(),
            Some(role) => role
                .parse::<Role>()
                .map_err(|_| AppError::unauthorized("Token role is not allowed"))?,
        };

        Ok(AuthenticatedUser {
            user_id: decoded.claims.sub,
            role,
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

fn validate_temporal_claims(claims: &AccessClaims, clock_skew: Duration) -> Result<(), AppError> {
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    let iat = claims
        .iat
        .ok_or_else(|| AppError::unauthorized("Token missing `iat` claim"))?;
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Token `iat` is in the future"));
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token is not yet valid"));
        }
    }

    Ok(())
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub(crate) const SECRET: &str = "test-signing-secret-0123456789abcdef";

    pub(crate) fn claims(sub: &str, role: Option<&str>) -> AccessClaims {
        let now = chrono::Utc::now().timestamp();
        AccessClaims {
            sub: sub.to_string(),
            role: role.map(str::to_string),
            token_type: Some("access".to_string()),
            iss: None,
            exp: Some(now + 300),
            iat: Some(now),
            nbf: None,
        }
    }

    pub(crate) fn sign(claims: &AccessClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier {
            key: DecodingKey::from_secret(SECRET.as_bytes()),
            issuer: None,
            clock_skew: Duration::from_secs(30),
        }
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn verifies_role_from_claims() {
        let token = sign(&claims("m-1", Some("manager")), SECRET);
        let user = verifier().verify_access_token(&token).unwrap();
        assert_eq!(user.user_id, "m-1");
        assert_eq!(user.role, Role::Manager);

        let token = sign(&claims("u-1", None), SECRET);
        assert_eq!(verifier().verify_access_token(&token).unwrap().role, Role::Inspector);
    }

    #[test]
    fn rejects_wrong_secret_and_unknown_role() {
        let token = sign(&claims("u-1", None), "another-secret-0123456789abcdefgh");
        assert!(verifier().verify_access_token(&token).is_err());

        let token = sign(&claims("u-1", Some("superuser")), SECRET);
        let err = verifier().verify_access_token(&token).unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn rejects_refresh_tokens() {
        let mut refresh = claims("u-1", None);
        refresh.token_type = Some("refresh".to_string());
        let err = verifier()
            .verify_access_token(&sign(&refresh, SECRET))
            .unwrap_err();
        assert!(err.to_string().contains("access token"));
    }

    #[test]
    fn temporal_claims_require_exp_and_iat() {
        let mut claims = claims("user", None);
        claims.exp = None;
        claims.iat = None;
        let err = validate_temporal_claims(&claims, Duration::from_secs(60)).unwrap_err();
        assert!(err.to_string().contains("missing `exp`"));
    }

    #[test]
    fn temporal_claims_reject_expired_and_future_iat() {
        let now = chrono::Utc::now().timestamp();
        let mut expired = claims("user", None);
        expired.exp = Some(now - 120);
        let err = validate_temporal_claims(&expired, Duration::from_secs(30)).unwrap_err();
        assert!(err.to_string().contains("expired"));

        let mut future = claims("user", None);
        future.iat = Some(now + 120);
        let err = validate_temporal_claims(&future, Duration::from_secs(30)).unwrap_err();
        assert!(err.to_string().contains("future"));
    }
}
