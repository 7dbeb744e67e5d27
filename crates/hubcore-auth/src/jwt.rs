use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Claims for short-lived session JWTs issued after an interactive login,
/// used by the HTTP front-end's cookie/bearer middleware (see
/// `hub-server`). Git transport auth never uses JWTs — it authenticates
/// with Basic/Bearer credentials resolved straight to a [`TokenRecord`](crate::TokenRecord)
/// or password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, principal_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_verifies_own_token() {
        let codec = JwtCodec::new(b"test-secret", Duration::minutes(15));
        let principal = Uuid::new_v4();
        let token = codec.issue(principal).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.sub, principal);
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let codec_a = JwtCodec::new(b"secret-a", Duration::minutes(15));
        let codec_b = JwtCodec::new(b"secret-b", Duration::minutes(15));
        let token = codec_a.issue(Uuid::new_v4()).unwrap();
        assert!(codec_b.verify(&token).is_err());
    }
}
