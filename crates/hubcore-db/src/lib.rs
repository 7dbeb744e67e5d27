//! Metadata store: the Postgres-backed source of truth for everything
//! `hubcore_storage` doesn't keep on disk — identity, grants, protection
//! rules, the job queue, and the transactional outbox.

pub mod audit;
pub mod error;
pub mod grants;
pub mod jobs;
pub mod outbox;
pub mod owner;
pub mod pool;
pub mod principal;
pub mod protection;
pub mod refs;
pub mod repository;

pub use audit::{AuditEntry, AuditRepository};
pub use error::{DbError, Result};
pub use grants::GrantRepository;
pub use jobs::{JobRecord, JobRepository, JobStatus};
pub use outbox::{OutboxEvent, OutboxRepository};
pub use owner::OwnerRepository;
pub use pool::create_pool;
pub use principal::{Principal, PrincipalKind, PrincipalRepository, SshKeyRepository, TokenRepository};
pub use protection::ProtectionRepository;
pub use refs::{RefRecord, RefRepository};
pub use repository::{OwnerKind, RepoRecord, RepoRepository, RepoStore, Visibility};
