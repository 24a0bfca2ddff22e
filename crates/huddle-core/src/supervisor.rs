//! Single-active-call supervision
//!
//! At most one group-call session exists per supervisor. Starting a call
//! for a peer that already has the active session returns that session;
//! starting one for a different peer asks the embedder for confirmation
//! before the current call is discarded. Microphone access is gated
//! through the same embedder seam, so a session is never started without
//! capture permission.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CallConfig;
use crate::errors::{CallError, Result};
use crate::media::MediaTransportFactory;
use crate::session::{GroupCallSession, SessionDeps};
use crate::signaling::SignalingClient;
use crate::types::{ActiveCallRef, InternalCallId, PeerId};

/// Embedder decisions the supervisor defers to
#[async_trait]
pub trait CallGate: Send + Sync {
    /// Ask for capture permission; `false` blocks the call entirely
    async fn request_microphone_access(&self) -> bool;

    /// Ask whether the call in progress may be discarded in favor of a
    /// new one
    async fn confirm_discard_current_call(
        &self,
        current_peer: PeerId,
        new_peer: PeerId,
    ) -> bool;
}

/// Outcome of a call start request
#[derive(Debug)]
pub enum RequestOrJoin {
    /// A new session was started and is now the active call
    Started(Arc<GroupCallSession>),
    /// The requested peer already has the active call
    SamePeer(Arc<GroupCallSession>),
    /// The user kept the call in progress
    Declined,
}

/// Owns the single active session slot
pub struct CallSupervisor {
    my_peer_id: PeerId,
    signaling: Arc<dyn SignalingClient>,
    media_factory: Arc<dyn MediaTransportFactory>,
    gate: Arc<dyn CallGate>,
    config: CallConfig,
    active: Arc<Mutex<Option<Arc<GroupCallSession>>>>,
}

impl CallSupervisor {
    pub fn new(
        my_peer_id: PeerId,
        signaling: Arc<dyn SignalingClient>,
        media_factory: Arc<dyn MediaTransportFactory>,
        gate: Arc<dyn CallGate>,
        config: CallConfig,
    ) -> Self {
        Self {
            my_peer_id,
            signaling,
            media_factory,
            gate,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// The active session, if any
    pub async fn active_session(&self) -> Option<Arc<GroupCallSession>> {
        self.active.lock().await.clone()
    }

    /// Start a call for `peer_id`, or join `initial_call` if one is
    /// already known to be active on the backend.
    ///
    /// Joining the peer whose call is already active short-circuits to
    /// that session without touching any gate.
    pub async fn request_or_join(
        &self,
        peer_id: PeerId,
        initial_call: Option<ActiveCallRef>,
    ) -> Result<RequestOrJoin> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.peer_id() == peer_id {
                debug!("Call for {} already in progress", peer_id);
                return Ok(RequestOrJoin::SamePeer(current.clone()));
            }
            if !self.gate.confirm_discard_current_call(current.peer_id(), peer_id).await {
                return Ok(RequestOrJoin::Declined);
            }
        }

        if !self.gate.request_microphone_access().await {
            return Err(CallError::permission_denied("microphone access denied"));
        }

        if let Some(previous) = active.take() {
            info!("Discarding call for {} in favor of {}", previous.peer_id(), peer_id);
            let _ = previous.leave(false);
        }

        let session = GroupCallSession::start(SessionDeps {
            my_peer_id: self.my_peer_id,
            peer_id,
            initial_call,
            signaling: self.signaling.clone(),
            media_factory: self.media_factory.clone(),
            config: self.config.clone(),
        });
        *active = Some(session.clone());
        self.watch_removal(&session);
        Ok(RequestOrJoin::Started(session))
    }

    /// Leave the active call, if any; resolves once it is fully removed
    pub async fn leave_active(&self, terminate_if_possible: bool) {
        let session = self.active.lock().await.clone();
        if let Some(session) = session {
            let mut removed = session.leave(terminate_if_possible);
            while !*removed.borrow() {
                if removed.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Clear the slot when the session reports removal, unless another
    /// session already replaced it
    fn watch_removal(&self, session: &Arc<GroupCallSession>) {
        let internal_id = session.internal_id();
        let mut removed = session.can_be_removed();
        let active = self.active.clone();
        tokio::spawn(async move {
            loop {
                if *removed.borrow() {
                    break;
                }
                if removed.changed().await.is_err() {
                    break;
                }
            }
            let mut active = active.lock().await;
            if active.as_ref().map(|s| s.internal_id()) == Some(internal_id) {
                debug!("Active call slot cleared for session {}", internal_id);
                *active = None;
            }
        });
    }
}

/// Convenience lookup used by UI surfaces to decide between "join" and
/// "you are already in a call" affordances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveCallSnapshot {
    pub internal_id: InternalCallId,
    pub peer_id: PeerId,
}

impl CallSupervisor {
    pub async fn active_call_snapshot(&self) -> Option<ActiveCallSnapshot> {
        self.active.lock().await.as_ref().map(|session| ActiveCallSnapshot {
            internal_id: session.internal_id(),
            peer_id: session.peer_id(),
        })
    }
}
