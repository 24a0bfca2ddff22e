//! Group-call session state machine
//!
//! [`GroupCallSession`] drives one call through its lifecycle
//! (request -> active -> established, with an automatic reconnect path)
//! and is the single authority callers query for the state of their call.
//! All mutation happens on one event-loop task; see `inner`.

mod inner;
mod session;
pub(crate) mod tasks;


pub use session::{GroupCallSession, SessionDeps};
