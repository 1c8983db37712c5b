use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Identity provider user id
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies session tokens issued by the identity provider. Only an HS256
/// service can also mint tokens, which local runs and tests rely on.
pub struct JwtService {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: Some(EncodingKey::from_secret(secret.as_ref())),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validation: Validation::new(Algorithm::HS256),
            issuer: None,
        }
    }

    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::Auth(format!("Invalid RSA public key: {}", e)))?;

        Ok(Self {
            encoding_key: None,
            decoding_key,
            validation: Validation::new(Algorithm::RS256),
            issuer: None,
        })
    }

    /// The public key wins when both are configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let service = match (&config.jwt_public_key, &config.jwt_secret) {
            (Some(pem), _) => Self::from_rsa_pem(pem)?,
            (None, Some(secret)) => Self::new(secret),
            (None, None) => {
                return Err(AppError::Auth(
                    "Either AUTH_JWT_PUBLIC_KEY or AUTH_JWT_SECRET must be set".to_string(),
                ))
            }
        };

        Ok(match &config.jwt_issuer {
            Some(issuer) => service.with_issuer(issuer),
            None => service,
        })
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self.issuer = Some(issuer.to_string());
        self
    }

    pub fn generate_token(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| AppError::Auth("Token signing is not available".to_string()))?;

        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to generate token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AppError::Auth("Token has no subject".to_string()));
        }
        if self.issuer.is_some() && token_data.claims.iss != self.issuer {
            return Err(AppError::Auth("Token issuer mismatch".to_string()));
        }
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_verification() {
        let jwt_service = JwtService::new("test-secret");

        let token = jwt_service.generate_token("user_2abc", Duration::hours(1)).unwrap();
        let claims = jwt_service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "user_2abc");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejects_foreign_and_expired_tokens() {
        let ours = JwtService::new("test-secret");
        let theirs = JwtService::new("other-secret");

        let foreign = theirs.generate_token("user_2abc", Duration::hours(1)).unwrap();
        assert!(ours.verify_token(&foreign).is_err());

        let expired = ours.generate_token("user_2abc", Duration::hours(-2)).unwrap();
        assert!(ours.verify_token(&expired).is_err());
    }

    #[test]
    fn test_issuer_is_enforced() {
        let verifier = JwtService::new("test-secret").with_issuer("https://clerk.example.com");
        let unscoped = JwtService::new("test-secret");
        let elsewhere = JwtService::new("test-secret").with_issuer("https://other.example.com");

        let token = unscoped.generate_token("user_2abc", Duration::hours(1)).unwrap();
        assert!(verifier.verify_token(&token).is_err());

        let token = elsewhere.generate_token("user_2abc", Duration::hours(1)).unwrap();
        assert!(verifier.verify_token(&token).is_err());

        let token = verifier.generate_token("user_2abc", Duration::hours(1)).unwrap();
        assert_eq!(verifier.verify_token(&token).unwrap().iss.as_deref(), Some("https://clerk.example.com"));
    }

    #[test]
    fn test_config_requires_a_key() {
        let config = AuthConfig {
            jwt_secret: None,
            jwt_public_key: None,
            jwt_issuer: None,
            webhook_secret: None,
        };
        assert!(JwtService::from_config(&config).is_err());
        assert!(JwtService::from_rsa_pem("not a pem").is_err());
    }
}
