//! Git Engine: the pkt-line codec plus subprocess-backed upload-pack and
//! receive-pack transport. Shells out to the real `git` binary rather than
//! reimplementing pack negotiation — at the time of writing neither `git2`
//! nor `gix` implements the server side of the smart protocol.

pub mod commands;
pub mod engine;
pub mod error;
pub mod pktline;
pub mod quarantine;
pub mod receive;

pub use commands::{parse_receive_commands, CommandResult, ReceiveCommand, ZERO_OID};
pub use engine::{GitEngine, Service};
pub use error::{Error, Result};
pub use quarantine::{is_force_push, QuarantineDir};
