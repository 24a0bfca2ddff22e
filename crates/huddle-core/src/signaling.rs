//! Signaling collaborator seam
//!
//! The session state machine drives the backend exclusively through
//! [`SignalingClient`]; serialization and transport of these requests are
//! out of scope for this crate. Implementations must be cancel-safe: the
//! session aborts in-flight requests when it moves on (leave, reconnect,
//! teardown) and never awaits a stale completion.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::Result;
use crate::roster::RosterDelta;
use crate::types::{CallId, GroupCallInfo, MuteState, PeerId, RosterState, Ssrc};

/// Result of a successful join handshake
#[derive(Debug, Clone)]
pub struct JoinCallResult {
    pub info: GroupCallInfo,
    /// Server-assigned client parameters, handed verbatim to the transport
    pub client_params: String,
    /// Initial roster snapshot at the moment of joining
    pub roster: RosterState,
}

/// Operations the coordinator consumes from the signaling backend
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Look up a call known to be active; `Ok(None)` means it is gone
    async fn lookup_active_call(
        &self,
        call_id: CallId,
        access_hash: u64,
    ) -> Result<Option<GroupCallInfo>>;

    /// Create a new group call for the given peer (chat/channel)
    async fn create_call(&self, peer_id: PeerId) -> Result<GroupCallInfo>;

    /// Exchange the local join payload for client parameters and the
    /// initial roster
    async fn join_call(
        &self,
        peer_id: PeerId,
        call_id: CallId,
        access_hash: u64,
        join_payload: String,
        prefer_muted: bool,
    ) -> Result<JoinCallResult>;

    /// Remove the local participant, identified by its source SSRC
    async fn leave_call(&self, call_id: CallId, access_hash: u64, source_ssrc: Ssrc) -> Result<()>;

    /// Terminate the call for everyone
    async fn terminate_call(&self, call_id: CallId, access_hash: u64) -> Result<()>;

    /// Invite a peer into the call
    async fn invite_to_call(&self, call_id: CallId, access_hash: u64, peer_id: PeerId)
        -> Result<()>;

    /// Set or clear a participant's mute record
    async fn update_participant_mute(
        &self,
        call_id: CallId,
        access_hash: u64,
        peer_id: PeerId,
        mute_state: Option<MuteState>,
    ) -> Result<()>;

    /// Change the call-wide default mute-on-join policy
    async fn update_default_mute_policy(
        &self,
        call_id: CallId,
        access_hash: u64,
        is_muted: bool,
    ) -> Result<()>;

    /// Check whether the call is still reachable for our source.
    ///
    /// `Ok(true)` = reachable, `Ok(false)` = definitively gone (triggers
    /// reconnection), `Err` = transient failure (the probe retries).
    async fn liveness_probe(&self, call_id: CallId, access_hash: u64, ssrc: Ssrc) -> Result<bool>;

    /// Out-of-band roster delta stream, keyed by call id.
    ///
    /// Deltas for calls other than the active one are filtered out by the
    /// session, not by the implementation.
    fn roster_updates(&self) -> broadcast::Receiver<(CallId, RosterDelta)>;

    /// Report whether the local user is audibly active, for presence-style
    /// surfaces. Called only on edge transitions.
    async fn set_speaking_activity(&self, peer_id: PeerId, active: bool) -> Result<()>;
}
