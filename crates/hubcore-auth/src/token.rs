use chrono::{DateTime, Utc};

/// Bitmask of operations a token is allowed to perform. Stored as a plain
/// `u32` in the metadata store rather than a string list, so scope checks
/// are a single `&` instead of a collection scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scopes(pub u32);

impl Scopes {
    pub const REPO_READ: u32 = 1 << 0;
    pub const REPO_WRITE: u32 = 1 << 1;
    pub const REPO_ADMIN: u32 = 1 << 2;
    pub const WEBHOOK_MANAGE: u32 = 1 << 3;
    pub const CI_TRIGGER: u32 = 1 << 4;

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A bearer token's durable record, as fetched from the metadata store.
/// Hashing/lookup is the store's job; this type only answers "is it
/// currently usable".
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: uuid::Uuid,
    pub principal_id: uuid::Uuid,
    pub scopes: Scopes,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn is_usable(&self, now: DateTime<Utc>) -> Result<(), crate::Error> {
        if self.revoked_at.is_some() {
            return Err(crate::Error::TokenRevoked);
        }
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return Err(crate::Error::TokenExpired);
            }
        }
        Ok(())
    }

    pub fn has_scope(&self, flag: u32) -> bool {
        self.scopes.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scopes: u32, expires_at: Option<DateTime<Utc>>, revoked_at: Option<DateTime<Utc>>) -> TokenRecord {
        TokenRecord {
            id: uuid::Uuid::new_v4(),
            principal_id: uuid::Uuid::new_v4(),
            scopes: Scopes::new(scopes),
            expires_at,
            revoked_at,
        }
    }

    #[test]
    fn rejects_revoked_token() {
        let t = record(Scopes::REPO_READ, None, Some(Utc::now()));
        assert!(matches!(t.is_usable(Utc::now()), Err(crate::Error::TokenRevoked)));
    }

    #[test]
    fn rejects_expired_token() {
        let t = record(Scopes::REPO_READ, Some(Utc::now() - chrono::Duration::seconds(1)), None);
        assert!(matches!(t.is_usable(Utc::now()), Err(crate::Error::TokenExpired)));
    }

    #[test]
    fn accepts_live_token_and_checks_scope() {
        let t = record(Scopes::REPO_READ | Scopes::REPO_WRITE, None, None);
        assert!(t.is_usable(Utc::now()).is_ok());
        assert!(t.has_scope(Scopes::REPO_WRITE));
        assert!(!t.has_scope(Scopes::REPO_ADMIN));
    }
}
