//! JWT 认证模块
//!
//! 身份来自身份提供方签发的 token，本服务不管理用户账号。
//! `is_admin` 声明由签发方注入，声明存在即视为超级管理员。

use axum::http::HeaderMap;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use domain::Identity;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    #[serde(default)]
    pub is_admin: bool,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token，开发和测试工具使用。
    pub fn generate_token(&self, user_id: i64, is_admin: bool) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user_id,
            is_admin,
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthenticated(format!("token generation failed: {err}")))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthenticated(format!("invalid token: {err}")))
    }

    /// 从 token 恢复请求身份。
    pub fn identity_from_token(&self, token: &str) -> Result<Identity, ApiError> {
        let claims = self.verify_token(token)?;
        Ok(Identity {
            user_id: claims.user_id.into(),
            is_admin: claims.is_admin,
        })
    }

    /// 从请求头的 Bearer token 恢复请求身份。
    pub fn identity_from_headers(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthenticated("invalid authorization header format"))?;

        self.identity_from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "unit-test-secret-key-with-at-least-32-chars".to_owned(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn token_round_trips_identity() {
        let jwt = service();
        let token = jwt.generate_token(42, false).unwrap();
        let identity = jwt.identity_from_token(&token).unwrap();
        assert_eq!(identity.user_id.0, 42);
        assert!(!identity.is_admin);
    }

    #[test]
    fn admin_claim_survives_the_round_trip() {
        let jwt = service();
        let token = jwt.generate_token(7, true).unwrap();
        let identity = jwt.identity_from_token(&token).unwrap();
        assert!(identity.is_admin);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let jwt = service();
        assert!(jwt.identity_from_token("not-a-token").is_err());
    }
}
