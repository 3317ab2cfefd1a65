//! Wire and data-model types for the crucible job protocol.
//!
//! This crate contains the serde-serializable types shared between the
//! execution engine and its callers: the request/outcome model, the failure
//! taxonomy, launch and dispatcher configuration, and the tagged job
//! messages exchanged with the daemon over its socket.
//!
//! Types in this crate are pure data: no behavior beyond construction and
//! serialization. The execution semantics live in `crucible-engine`.

pub mod config;
pub mod message;
pub mod outcome;
pub mod request;

pub use config::*;
pub use message::*;
pub use outcome::*;
pub use request::*;
