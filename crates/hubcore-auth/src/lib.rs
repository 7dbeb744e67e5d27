//! Auth Resolver: password and token credential checks, SSH key
//! fingerprinting, JWT session issuance, and capability resolution with a
//! short-TTL cache. Pure logic only — callers (hubcore-db-backed lookups in
//! hub-server) own fetching the facts this crate combines.

pub mod cache;
pub mod capability;
pub mod error;
pub mod jwt;
pub mod password;
pub mod ssh;
pub mod token;

pub use cache::CapabilityCache;
pub use capability::{resolve as resolve_capability, Capability, CapabilityFacts};
pub use error::{Error, Result};
pub use jwt::{Claims, JwtCodec};
pub use password::{hash_password, verify_password, LockoutTracker};
pub use token::{Scopes, TokenRecord};
