//! Type definitions for the group-call coordination layer
//!
//! This module contains the value types shared between the session state
//! machine, the participant roster, the speaking-activity tracker and the
//! collaborator seams: identifiers, call descriptors, mute records and the
//! externally observed state/membership snapshots.
//!
//! All snapshot types derive `PartialEq`; observables publish a new value
//! only when the snapshot structurally changed, so consumers can rely on
//! every received value being distinct from the previous one.

use std::collections::HashSet;
use serde::{Deserialize, Serialize};

// ===== IDENTIFIERS =====

/// Peer identity as issued by the signaling backend
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PeerId(pub i64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Server-side group call identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CallId(pub i64);

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Synchronization-source identifier correlating a media stream with a peer
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Ssrc(pub u32);

impl std::fmt::Display for Ssrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssrc-{}", self.0)
    }
}

/// Process-local identity of one session instance
///
/// A new call always gets a new `InternalCallId`; the supervisor uses it to
/// tell whether a stored session handle is the one a completion belongs to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct InternalCallId(pub uuid::Uuid);

impl InternalCallId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for InternalCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== CALL DESCRIPTORS =====

/// Identifies one group call on the signaling backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCallInfo {
    /// Opaque call identifier
    pub id: CallId,
    /// Access credential presented with every call-scoped request
    pub access_hash: u64,
}

/// Reference to a call discovered active for a peer, used to seed lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCallRef {
    pub id: CallId,
    pub access_hash: u64,
}

// ===== MUTE STATE =====

/// Authoritative mute record for a participant
///
/// Absence of a record means unmuted and unrestricted. A record with
/// `can_unmute: false` is a forced mute: the affected client may not clear
/// it locally, only a roster update can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteState {
    pub can_unmute: bool,
}

/// Local mute intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteAction {
    Muted { push_to_talk_active: bool },
    Unmuted,
}

impl MuteAction {
    /// Whether this intent silences the microphone right now
    pub fn is_effectively_muted(&self) -> bool {
        match self {
            MuteAction::Muted { push_to_talk_active } => !push_to_talk_active,
            MuteAction::Unmuted => false,
        }
    }
}

/// Call-wide default mute policy as shown to the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultMuteState {
    Muted,
    Unmuted,
}

/// Default mute-on-join policy carried by the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultMutePolicy {
    pub is_muted: bool,
    /// Whether the local user is allowed to change the policy
    pub can_change: bool,
}

// ===== NETWORK =====

/// Media-path connectivity as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Connecting,
    Connected,
}

// ===== PARTICIPANTS =====

/// One call member as carried by the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub peer_id: PeerId,
    /// Transport source for this participant; rebound if the participant
    /// rejoins with a new source
    pub ssrc: Ssrc,
    /// Authoritative mute record; `None` = unmuted and unrestricted
    pub mute_state: Option<MuteState>,
    pub is_admin: bool,
    /// Last known audio energy, for presentation ordering hints
    pub activity_level: f32,
}

/// Full roster snapshot delivered at establishment (and on resync)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterState {
    /// Participants in server arrival order
    pub participants: Vec<Participant>,
    /// Server-declared total, may exceed the materialized list
    pub total_count: usize,
    pub admin_ids: HashSet<PeerId>,
    /// Whether the local user created the call
    pub is_creator: bool,
    pub default_participants_are_muted: DefaultMutePolicy,
    /// Continuation token when the roster is larger than what was fetched
    pub next_fetch_offset: Option<String>,
}

// ===== OBSERVED STATE =====

/// Externally observed call state
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCallState {
    pub network_state: NetworkState,
    pub can_manage_call: bool,
    pub admin_ids: HashSet<PeerId>,
    /// Local participant's mute record; `None` = unmuted
    pub mute_state: Option<MuteState>,
    /// Default-mute policy, populated only for users who can manage the call
    pub default_participant_mute_state: Option<DefaultMuteState>,
}

impl Default for GroupCallState {
    fn default() -> Self {
        Self {
            network_state: NetworkState::Connecting,
            can_manage_call: false,
            admin_ids: HashSet::new(),
            mute_state: Some(MuteState { can_unmute: true }),
            default_participant_mute_state: None,
        }
    }
}

/// Externally observed membership view
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCallMembers {
    /// All materialized participants in arrival order
    pub participants: Vec<Participant>,
    /// Peers currently classified as speaking
    pub speaking_peers: HashSet<PeerId>,
    /// Server-declared participant total
    pub total_count: usize,
    /// Continuation token for incremental roster loading
    pub load_more_token: Option<String>,
}

/// Condensed call summary for list surfaces
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCallSummary {
    pub info: GroupCallInfo,
    pub participant_count: usize,
    pub call_state: GroupCallState,
    /// First N participants by arrival order, N fixed and small
    pub top_participants: Vec<Participant>,
    pub active_speaker_count: usize,
}
