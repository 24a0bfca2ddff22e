//! Public session handle
//!
//! `GroupCallSession` is the caller-facing side of the state machine:
//! commands are forwarded onto the session's serialized event loop, and
//! state is observed through watch/broadcast subscriptions that only emit
//! on structural change.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::config::CallConfig;
use crate::media::MediaTransportFactory;
use crate::signaling::SignalingClient;
use crate::types::{
    ActiveCallRef, GroupCallMembers, GroupCallState, GroupCallSummary, InternalCallId, MuteAction,
    PeerId,
};

use super::inner::{SessionCommand, SessionInner, SessionMessage, SessionPublishers};

/// Everything a session needs from its environment
#[derive(Clone)]
pub struct SessionDeps {
    /// The local user's peer identity
    pub my_peer_id: PeerId,
    /// The peer (chat/channel) the call belongs to
    pub peer_id: PeerId,
    /// A call already known to be active for the peer, if any
    pub initial_call: Option<ActiveCallRef>,
    pub signaling: Arc<dyn SignalingClient>,
    pub media_factory: Arc<dyn MediaTransportFactory>,
    pub config: CallConfig,
}

/// Handle to one live group-call session
///
/// Cheap to share behind `Arc`; dropping the last handle leaves the call
/// (without terminating it) and tears the session down.
pub struct GroupCallSession {
    internal_id: InternalCallId,
    peer_id: PeerId,
    tx: mpsc::UnboundedSender<SessionMessage>,

    state_rx: watch::Receiver<GroupCallState>,
    members_rx: watch::Receiver<Option<GroupCallMembers>>,
    summary_rx: watch::Receiver<Option<GroupCallSummary>>,
    is_muted_rx: watch::Receiver<MuteAction>,
    invited_peers_rx: watch::Receiver<HashSet<PeerId>>,
    can_be_removed_rx: watch::Receiver<bool>,
    audio_levels_tx: broadcast::Sender<Vec<(PeerId, f32)>>,
    my_audio_level_tx: broadcast::Sender<f32>,
}

impl GroupCallSession {
    /// Spawn the session event loop and immediately begin call acquisition
    pub fn start(deps: SessionDeps) -> Arc<Self> {
        let internal_id = InternalCallId::new();
        let peer_id = deps.peer_id;

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(GroupCallState::default());
        let (members_tx, members_rx) = watch::channel(None);
        let (summary_tx, summary_rx) = watch::channel(None);
        let (is_muted_tx, is_muted_rx) =
            watch::channel(MuteAction::Muted { push_to_talk_active: false });
        let (invited_peers_tx, invited_peers_rx) = watch::channel(HashSet::new());
        let (can_be_removed_tx, can_be_removed_rx) = watch::channel(false);
        let (audio_levels_tx, _) = broadcast::channel(64);
        let (my_audio_level_tx, _) = broadcast::channel(64);

        let publishers = SessionPublishers {
            state: state_tx,
            members: members_tx,
            summary: summary_tx,
            is_muted: is_muted_tx,
            invited_peers: invited_peers_tx,
            can_be_removed: can_be_removed_tx,
            audio_levels: audio_levels_tx.clone(),
            my_audio_level: my_audio_level_tx.clone(),
        };

        debug!("Starting group call session {} for {}", internal_id, peer_id);
        let inner = SessionInner::new(deps, internal_id, tx.clone(), publishers);
        tokio::spawn(inner.run(rx));

        Arc::new(Self {
            internal_id,
            peer_id,
            tx,
            state_rx,
            members_rx,
            summary_rx,
            is_muted_rx,
            invited_peers_rx,
            can_be_removed_rx,
            audio_levels_tx,
            my_audio_level_tx,
        })
    }

    /// Process-local identity of this session instance
    pub fn internal_id(&self) -> InternalCallId {
        self.internal_id
    }

    /// The peer this call belongs to
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    // ===== OBSERVABLES =====

    /// Call state: connectivity, management rights, mute records
    pub fn state(&self) -> watch::Receiver<GroupCallState> {
        self.state_rx.clone()
    }

    /// Merged membership view; `None` until the session is established
    pub fn members(&self) -> watch::Receiver<Option<GroupCallMembers>> {
        self.members_rx.clone()
    }

    /// Condensed summary for list surfaces
    pub fn summary_state(&self) -> watch::Receiver<Option<GroupCallSummary>> {
        self.summary_rx.clone()
    }

    /// Local mute intent
    pub fn is_muted(&self) -> watch::Receiver<MuteAction> {
        self.is_muted_rx.clone()
    }

    /// Peers invited during this session, for UI badges
    pub fn invited_peers(&self) -> watch::Receiver<HashSet<PeerId>> {
        self.invited_peers_rx.clone()
    }

    /// Latches to `true` exactly once when teardown completes
    pub fn can_be_removed(&self) -> watch::Receiver<bool> {
        self.can_be_removed_rx.clone()
    }

    /// Per-peer audio energy batches, already translated from SSRCs
    pub fn audio_levels(&self) -> broadcast::Receiver<Vec<(PeerId, f32)>> {
        self.audio_levels_tx.subscribe()
    }

    /// Raw local microphone energy
    pub fn my_audio_level(&self) -> broadcast::Receiver<f32> {
        self.my_audio_level_tx.subscribe()
    }

    // ===== COMMANDS =====

    /// Leave the call; with `terminate_if_possible` the whole call is
    /// terminated for everyone (if the backend accepts it).
    ///
    /// Returns the removal observable, which resolves to `true` exactly
    /// once, idempotently, even if the backend request fails after being
    /// accepted locally.
    pub fn leave(&self, terminate_if_possible: bool) -> watch::Receiver<bool> {
        self.send(SessionCommand::Leave { terminate_if_possible });
        self.can_be_removed_rx.clone()
    }

    /// Flip between muted and unmuted, honoring a forced-mute lock
    pub fn toggle_is_muted(&self) {
        self.send(SessionCommand::ToggleIsMuted);
    }

    /// Set the local mute intent; a no-op while a `can_unmute: false`
    /// record is in force
    pub fn set_is_muted(&self, action: MuteAction) {
        self.send(SessionCommand::SetIsMuted(action));
    }

    /// Issue an authoritative mute-state change for any participant
    pub fn update_mute_state(&self, peer_id: PeerId, is_muted: bool) {
        self.send(SessionCommand::UpdateMuteState { peer_id, is_muted });
    }

    /// Invite a peer; duplicate invites within this session are dropped
    pub fn invite_peer(&self, peer_id: PeerId) {
        self.send(SessionCommand::InvitePeer(peer_id));
    }

    /// Change the call-wide default mute-on-join policy
    pub fn update_default_participants_are_muted(&self, is_muted: bool) {
        self.send(SessionCommand::UpdateDefaultParticipantsAreMuted(is_muted));
    }

    /// Switch the capture device on the live transport
    pub fn switch_audio_input(&self, device_id: impl Into<String>) {
        self.send(SessionCommand::SwitchAudioInput(device_id.into()));
    }

    /// Switch the playback device on the live transport
    pub fn switch_audio_output(&self, device_id: impl Into<String>) {
        self.send(SessionCommand::SwitchAudioOutput(device_id.into()));
    }

    fn send(&self, command: SessionCommand) {
        // The loop is gone once removal completed; commands become no-ops.
        let _ = self.tx.send(SessionMessage::Command(command));
    }
}

impl Drop for GroupCallSession {
    fn drop(&mut self) {
        // Disposal leaves the call (no terminate) so the event loop can
        // cancel every outstanding task and stop the transport.
        let _ = self.tx.send(SessionMessage::Command(SessionCommand::Leave {
            terminate_if_possible: false,
        }));
    }
}

impl std::fmt::Debug for GroupCallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCallSession")
            .field("internal_id", &self.internal_id)
            .field("peer_id", &self.peer_id)
            .finish()
    }
}
