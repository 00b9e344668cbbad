use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gatepass_common::{Principal, Role};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub roles: Vec<Role>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal::new(self.sub, self.roles.clone())
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    pub fn create_token(&self, user_id: Uuid, roles: Vec<Role>) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(24);

        let claims = Claims {
            sub: user_id,
            roles,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test-secret", "gatepass".to_string())
    }

    #[test]
    fn roundtrip_token() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc.create_token(user_id, vec![Role::Admin]).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.roles, vec![Role::Admin]);
        assert!(claims.principal().is_admin());
    }

    #[test]
    fn plain_token_has_no_roles() {
        let svc = service();
        let token = svc.create_token(Uuid::new_v4(), vec![]).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert!(claims.roles.is_empty());
        assert!(!claims.principal().is_admin());
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = service().create_token(Uuid::new_v4(), vec![]).unwrap();
        let other = JwtService::new("other-secret", "gatepass".to_string());
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn rejects_wrong_issuer() {
        let token = service().create_token(Uuid::new_v4(), vec![]).unwrap();
        let other = JwtService::new("test-secret", "someone-else".to_string());
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let svc = service();
        // Encode a token that ran out two hours ago, past any leeway.
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4(),
            roles: vec![],
            exp: (now - chrono::Duration::hours(2)).timestamp(),
            iat: (now - chrono::Duration::hours(3)).timestamp(),
            iss: "gatepass".to_string(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(svc.verify_token(&token).is_err());
    }
}
