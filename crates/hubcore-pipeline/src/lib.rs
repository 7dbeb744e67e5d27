//! Write Pipeline: orchestrates a `git-receive-pack` push from quarantine
//! through the metadata commit to event publication, under the
//! two-lock ordering (filesystem lock, then repository row lock) that
//! keeps concurrent writers to one repository serialized while writers to
//! distinct repositories never contend.

pub mod context;
pub mod error;
pub mod events;
pub mod facts;
pub mod hooks;
pub mod protection_cache;
pub mod push;
pub mod reconcile;

pub use context::{PipelineContext, RequestContext};
pub use error::{PipelineError, Result};
pub use facts::{NoReviews, ReviewFacts, ReviewFactsProvider};
pub use push::{PushOutcome, ReceivePushPipeline};
pub use reconcile::{reconcile_all, ReconcileOutcome};
