//! # huddle-core
//!
//! Group-call session coordination: the layer between an application's
//! call UI and the two engines that actually move bytes, the signaling
//! backend and the media transport.
//!
//! The crate owns the call lifecycle (request, join, establish, reconnect,
//! leave), the authoritative participant roster, speaking-activity
//! classification and the single-active-call policy. It deliberately does
//! NOT serialize network requests or touch audio devices; those live
//! behind the [`SignalingClient`] and [`MediaTransport`] seams supplied by
//! the embedder.
//!
//! ## Architecture
//!
//! ```text
//! CallSupervisor ── one active call, permission + confirmation gates
//!       │
//! GroupCallSession ── public handle, observables (watch/broadcast)
//!       │
//! session event loop ── serialized state machine, epoch-tagged work
//!    │        │
//! Signaling  Media
//!  Client   Transport
//! ```
//!
//! Every observable publishes only on structural change, so consumers can
//! treat each received value as distinct from the previous one.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use huddle_core::{CallConfig, GroupCallSession, SessionDeps, PeerId};
//! # use huddle_core::{SignalingClient, MediaTransportFactory};
//!
//! # async fn example(
//! #     signaling: Arc<dyn SignalingClient>,
//! #     media_factory: Arc<dyn MediaTransportFactory>,
//! # ) {
//! let session = GroupCallSession::start(SessionDeps {
//!     my_peer_id: PeerId(1),
//!     peer_id: PeerId(42),
//!     initial_call: None,
//!     signaling,
//!     media_factory,
//!     config: CallConfig::default(),
//! });
//!
//! let mut members = session.members();
//! while members.changed().await.is_ok() {
//!     if let Some(members) = members.borrow().clone() {
//!         println!("{} participants", members.total_count);
//!     }
//! }
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod media;
pub mod roster;
pub mod session;
pub mod signaling;
pub mod speaking;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CallConfig;
pub use errors::{CallError, Result};
pub use media::{MediaTransport, MediaTransportFactory};
pub use roster::{ParticipantRosterContext, RosterDelta};
pub use session::{GroupCallSession, SessionDeps};
pub use signaling::{JoinCallResult, SignalingClient};
pub use speaking::SpeakingActivityTracker;
pub use supervisor::{ActiveCallSnapshot, CallGate, CallSupervisor, RequestOrJoin};
pub use types::{
    ActiveCallRef, CallId, DefaultMutePolicy, DefaultMuteState, GroupCallInfo, GroupCallMembers,
    GroupCallState, GroupCallSummary, InternalCallId, MuteAction, MuteState, NetworkState,
    Participant, PeerId, RosterState, Ssrc,
};
