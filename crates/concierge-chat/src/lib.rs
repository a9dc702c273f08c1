//! Assistant session for the storefront.
//!
//! [`SessionEngine`] owns a chat session: the message history, the current
//! conversation id, the in-flight flag, hint caches and the transient rating.
//! Observers read [`SessionSnapshot`]s; all mutation goes through engine
//! commands. [`ReportQuery`] is the single-shot report variant.

pub mod engine;
pub mod error;
mod guard;
pub mod report;
pub mod session;

pub use engine::{SendOutcome, SessionEngine};
pub use error::ChatError;
pub use report::{ReportQuery, ReportSnapshot};
pub use session::{Reconciled, SendTicket, SessionSnapshot, SessionState};
