//! Session event loop
//!
//! All session state lives in [`SessionInner`], owned by a single spawned
//! task. Commands from the handle and completions/stream items from
//! collaborator tasks are funneled through one unbounded channel, so no
//! two handlers ever run concurrently against the same session: this is
//! the serialization that makes the SSRC map, the roster and the mute
//! records safe without locks.
//!
//! Every asynchronous continuation is tagged with the state epoch it was
//! issued under. A transition that invalidates in-flight work (reconnect,
//! leave) bumps the epoch; completions from a stale epoch are logged and
//! dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::CallError;
use crate::media::MediaTransport;
use crate::roster::{ParticipantRosterContext, RosterDelta};
use crate::signaling::JoinCallResult;
use crate::speaking::SpeakingActivityTracker;
use crate::types::{
    CallId, DefaultMuteState, GroupCallInfo, GroupCallMembers, GroupCallState, GroupCallSummary,
    InternalCallId, MuteAction, MuteState, NetworkState, PeerId, Ssrc,
};

use super::session::SessionDeps;
use super::tasks::TaskBag;

/// Commands accepted from the session handle
#[derive(Debug, Clone)]
pub(crate) enum SessionCommand {
    Leave { terminate_if_possible: bool },
    ToggleIsMuted,
    SetIsMuted(MuteAction),
    UpdateMuteState { peer_id: PeerId, is_muted: bool },
    InvitePeer(PeerId),
    UpdateDefaultParticipantsAreMuted(bool),
    SwitchAudioInput(String),
    SwitchAudioOutput(String),
}

/// Completions and stream items redelivered onto the session loop
#[derive(Debug)]
pub(crate) enum SessionEvent {
    CallResolved { epoch: u64, info: GroupCallInfo },
    CallRequestFailed { epoch: u64, error: CallError },
    Joined { epoch: u64, result: JoinCallResult, local_ssrc: Ssrc },
    JoinFailed { epoch: u64, error: CallError },
    NetworkStateChanged { epoch: u64, state: NetworkState },
    AudioLevels { epoch: u64, levels: Vec<(Ssrc, f32)> },
    MyAudioLevel { epoch: u64, level: f32 },
    MyLevelTick { epoch: u64 },
    LivenessLost { epoch: u64 },
    RosterDelta { call_id: CallId, delta: RosterDelta },
    LeaveCompleted,
}

#[derive(Debug)]
pub(crate) enum SessionMessage {
    Command(SessionCommand),
    Event(SessionEvent),
}

/// Senders for every externally observable value
pub(crate) struct SessionPublishers {
    pub state: watch::Sender<GroupCallState>,
    pub members: watch::Sender<Option<GroupCallMembers>>,
    pub summary: watch::Sender<Option<GroupCallSummary>>,
    pub is_muted: watch::Sender<MuteAction>,
    pub invited_peers: watch::Sender<HashSet<PeerId>>,
    pub can_be_removed: watch::Sender<bool>,
    pub audio_levels: broadcast::Sender<Vec<(PeerId, f32)>>,
    pub my_audio_level: broadcast::Sender<f32>,
}

/// Call lifecycle; strictly forward-progressing except for the explicit
/// reconnect path back to `Requesting`
#[derive(Debug, Clone, Copy)]
enum InternalState {
    Requesting,
    Active(GroupCallInfo),
    Established { info: GroupCallInfo, local_ssrc: Ssrc },
}

pub(crate) struct SessionInner {
    deps: SessionDeps,
    internal_id: InternalCallId,
    tx: mpsc::UnboundedSender<SessionMessage>,
    publishers: SessionPublishers,

    epoch: u64,
    internal_state: InternalState,
    transport: Option<Arc<dyn MediaTransport>>,
    ssrc_mapping: HashMap<Ssrc, PeerId>,
    roster: Option<ParticipantRosterContext>,
    speaking: SpeakingActivityTracker,
    tasks: TaskBag,

    state_value: GroupCallState,
    members_value: Option<GroupCallMembers>,
    is_muted_value: MuteAction,
    invited_peers: HashSet<PeerId>,
    is_currently_connecting: Option<bool>,

    // Local-level debounce
    last_loud_at: Option<Instant>,
    is_sending_activity: bool,

    removed: bool,
}

impl SessionInner {
    pub fn new(
        deps: SessionDeps,
        internal_id: InternalCallId,
        tx: mpsc::UnboundedSender<SessionMessage>,
        publishers: SessionPublishers,
    ) -> Self {
        let speaking = SpeakingActivityTracker::new(&deps.config);
        Self {
            deps,
            internal_id,
            tx,
            publishers,
            epoch: 0,
            internal_state: InternalState::Requesting,
            transport: None,
            ssrc_mapping: HashMap::new(),
            roster: None,
            speaking,
            tasks: TaskBag::new(),
            state_value: GroupCallState::default(),
            members_value: None,
            is_muted_value: MuteAction::Muted { push_to_talk_active: false },
            invited_peers: HashSet::new(),
            is_currently_connecting: None,
            last_loud_at: None,
            is_sending_activity: false,
            removed: false,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
        self.spawn_roster_forwarder();
        self.request_call();

        while let Some(message) = rx.recv().await {
            match message {
                SessionMessage::Command(command) => self.handle_command(command).await,
                SessionMessage::Event(event) => self.handle_event(event).await,
            }
            if self.removed {
                break;
            }
        }

        self.tasks.clear_all();
        if let Some(transport) = self.transport.take() {
            transport.stop().await;
        }
        debug!("Session {} event loop finished", self.internal_id);
    }

    fn is_current(&self, epoch: u64) -> bool {
        if epoch == self.epoch {
            true
        } else {
            debug!(
                "Session {}: dropping completion from stale epoch {} (now {})",
                self.internal_id, epoch, self.epoch
            );
            false
        }
    }

    // ===== COMMANDS =====

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Leave { terminate_if_possible } => {
                self.leave(terminate_if_possible);
            }
            SessionCommand::ToggleIsMuted => {
                let action = match self.is_muted_value {
                    MuteAction::Muted { .. } => MuteAction::Unmuted,
                    MuteAction::Unmuted => MuteAction::Muted { push_to_talk_active: false },
                };
                self.set_is_muted(action).await;
            }
            SessionCommand::SetIsMuted(action) => self.set_is_muted(action).await,
            SessionCommand::UpdateMuteState { peer_id, is_muted } => {
                self.update_mute_state(peer_id, is_muted);
            }
            SessionCommand::InvitePeer(peer_id) => self.invite_peer(peer_id),
            SessionCommand::UpdateDefaultParticipantsAreMuted(is_muted) => {
                self.update_default_participants_are_muted(is_muted);
            }
            SessionCommand::SwitchAudioInput(device_id) => {
                if let Some(transport) = &self.transport {
                    transport.switch_audio_input(device_id).await;
                }
            }
            SessionCommand::SwitchAudioOutput(device_id) => {
                if let Some(transport) = &self.transport {
                    transport.switch_audio_output(device_id).await;
                }
            }
        }
    }

    fn leave(&mut self, terminate_if_possible: bool) {
        if self.removed {
            return;
        }
        if let InternalState::Established { info, local_ssrc } = self.internal_state {
            let signaling = self.deps.signaling.clone();
            let tx = self.tx.clone();
            self.tasks.leave.set(tokio::spawn(async move {
                let result = if terminate_if_possible {
                    signaling.terminate_call(info.id, info.access_hash).await
                } else {
                    signaling.leave_call(info.id, info.access_hash, local_ssrc).await
                };
                if let Err(error) = result {
                    // Accepted locally; the backend failure is not retried.
                    warn!("Leave request for {} failed: {}", info.id, error);
                }
                let _ = tx.send(SessionMessage::Event(SessionEvent::LeaveCompleted));
            }));
        } else {
            // Not yet established: just cancel the in-flight acquisition.
            self.tasks.request.clear();
            self.complete_removal();
        }
    }

    async fn set_is_muted(&mut self, action: MuteAction) {
        if self.is_muted_value == action {
            return;
        }
        if let Some(mute_state) = self.state_value.mute_state {
            if !mute_state.can_unmute {
                // Forced mute: only an authoritative roster update clears it.
                debug!("Session {}: mute change rejected while locked", self.internal_id);
                return;
            }
        }
        self.is_muted_value = action;
        self.publishers.is_muted.send_replace(action);

        let is_effectively_muted = action.is_effectively_muted();
        let is_muted = matches!(action, MuteAction::Muted { .. });
        self.update_mute_state(self.deps.my_peer_id, is_muted);

        if let Some(transport) = &self.transport {
            transport.set_is_muted(is_effectively_muted).await;
        }
        self.set_state(|state| {
            state.mute_state = if is_effectively_muted {
                Some(MuteState { can_unmute: true })
            } else {
                None
            };
        });
    }

    /// Issue an authoritative mute-state roster update.
    ///
    /// The `can_unmute` computation mirrors the production rules: locking
    /// (`can_unmute: false`) only happens when a call manager mutes a
    /// non-admin; every other branch stays permissive.
    fn update_mute_state(&mut self, peer_id: PeerId, is_muted: bool) {
        let Some(info) = self.established_info() else {
            return;
        };
        let my_peer_id = self.deps.my_peer_id;

        let mute_state = if is_muted {
            let can_then_unmute = if peer_id == my_peer_id {
                true
            } else if self.state_value.can_manage_call {
                self.state_value.admin_ids.contains(&peer_id)
            } else {
                true
            };
            Some(MuteState { can_unmute: can_then_unmute })
        } else if peer_id == my_peer_id {
            // Self-unmute clears the record entirely.
            None
        } else {
            // Unmuting someone else only lifts the lock; their own client
            // clears the local mute flag.
            Some(MuteState { can_unmute: true })
        };

        // Fire and forget; a later update must not cancel this one.
        let signaling = self.deps.signaling.clone();
        tokio::spawn(async move {
            if let Err(error) = signaling
                .update_participant_mute(info.id, info.access_hash, peer_id, mute_state)
                .await
            {
                warn!("Mute update for {} failed: {}", peer_id, error);
            }
        });
    }

    fn invite_peer(&mut self, peer_id: PeerId) {
        let Some(info) = self.established_info() else {
            return;
        };
        if !self.invited_peers.insert(peer_id) {
            return;
        }
        self.publishers.invited_peers.send_replace(self.invited_peers.clone());

        // Fire and forget; every deduplicated invite must reach the
        // backend even when several are issued in one burst.
        let signaling = self.deps.signaling.clone();
        tokio::spawn(async move {
            if let Err(error) = signaling.invite_to_call(info.id, info.access_hash, peer_id).await {
                warn!("Invite of {} to {} failed: {}", peer_id, info.id, error);
            }
        });
    }

    fn update_default_participants_are_muted(&mut self, is_muted: bool) {
        let Some(info) = self.established_info() else {
            return;
        };
        let signaling = self.deps.signaling.clone();
        tokio::spawn(async move {
            if let Err(error) =
                signaling.update_default_mute_policy(info.id, info.access_hash, is_muted).await
            {
                warn!("Default mute policy update for {} failed: {}", info.id, error);
            }
        });

        if self.state_value.can_manage_call {
            self.set_state(|state| {
                state.default_participant_mute_state = Some(if is_muted {
                    DefaultMuteState::Muted
                } else {
                    DefaultMuteState::Unmuted
                });
            });
        }
    }

    // ===== EVENTS =====

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::CallResolved { epoch, info } => {
                if self.is_current(epoch) {
                    self.enter_active(info);
                }
            }
            SessionEvent::CallRequestFailed { epoch, error } => {
                if self.is_current(epoch) {
                    // Stalled in Requesting; retry is the caller's call.
                    warn!("Session {}: call acquisition failed: {}", self.internal_id, error);
                }
            }
            SessionEvent::Joined { epoch, result, local_ssrc } => {
                if self.is_current(epoch) {
                    self.enter_established(result, local_ssrc).await;
                }
            }
            SessionEvent::JoinFailed { epoch, error } => {
                if self.is_current(epoch) {
                    warn!("Session {}: join handshake failed: {}", self.internal_id, error);
                }
            }
            SessionEvent::NetworkStateChanged { epoch, state } => {
                if self.is_current(epoch) {
                    self.network_state_changed(state);
                }
            }
            SessionEvent::AudioLevels { epoch, levels } => {
                if self.is_current(epoch) {
                    self.audio_levels_received(levels);
                }
            }
            SessionEvent::MyAudioLevel { epoch, level } => {
                if self.is_current(epoch) {
                    self.my_audio_level_received(level);
                }
            }
            SessionEvent::MyLevelTick { epoch } => {
                if self.is_current(epoch) {
                    self.my_level_tick();
                }
            }
            SessionEvent::LivenessLost { epoch } => {
                if self.is_current(epoch) {
                    info!(
                        "Session {}: call no longer reachable, reconnecting 🔄",
                        self.internal_id
                    );
                    self.request_call();
                }
            }
            SessionEvent::RosterDelta { call_id, delta } => {
                self.roster_delta_received(call_id, delta).await;
            }
            SessionEvent::LeaveCompleted => self.complete_removal(),
        }
    }

    // ===== LIFECYCLE =====

    /// Enter (or re-enter) `Requesting` and run call lookup/creation
    fn request_call(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;

        self.tasks.clear_transport_bound();
        self.reset_activity_signal();
        if let Some(transport) = self.transport.take() {
            tokio::spawn(async move { transport.stop().await });
        }
        self.internal_state = InternalState::Requesting;
        self.roster = None;
        self.ssrc_mapping.clear();
        self.is_currently_connecting = None;

        let signaling = self.deps.signaling.clone();
        let initial_call = self.deps.initial_call;
        let peer_id = self.deps.peer_id;
        let tx = self.tx.clone();
        debug!("Session {}: requesting call (epoch {})", self.internal_id, epoch);

        self.tasks.request.set(tokio::spawn(async move {
            let resolved = async {
                if let Some(active) = initial_call {
                    if let Some(info) =
                        signaling.lookup_active_call(active.id, active.access_hash).await?
                    {
                        return Ok(info);
                    }
                }
                signaling.create_call(peer_id).await
            }
            .await;

            let event = match resolved {
                Ok(info) => SessionEvent::CallResolved { epoch, info },
                Err(error) => SessionEvent::CallRequestFailed { epoch, error },
            };
            let _ = tx.send(SessionMessage::Event(event));
        }));
    }

    /// `Requesting -> Active`: allocate a transport and run the join
    /// handshake off its one-shot join payload
    fn enter_active(&mut self, info: GroupCallInfo) {
        info!("Session {}: call {} active, joining", self.internal_id, info.id);
        self.internal_state = InternalState::Active(info);

        let transport = self.deps.media_factory.create_transport();
        self.transport = Some(transport.clone());
        let epoch = self.epoch;

        // Connectivity stream.
        let mut network_rx = transport.network_state();
        let tx = self.tx.clone();
        self.tasks.network_state.set(tokio::spawn(async move {
            let initial = *network_rx.borrow_and_update();
            let _ = tx.send(SessionMessage::Event(SessionEvent::NetworkStateChanged {
                epoch,
                state: initial,
            }));
            while network_rx.changed().await.is_ok() {
                let state = *network_rx.borrow_and_update();
                let _ = tx.send(SessionMessage::Event(SessionEvent::NetworkStateChanged {
                    epoch,
                    state,
                }));
            }
        }));

        // Per-source audio energy stream.
        let mut levels_rx = transport.audio_levels();
        let tx = self.tx.clone();
        self.tasks.audio_levels.set(tokio::spawn(async move {
            loop {
                match levels_rx.recv().await {
                    Ok(levels) => {
                        let _ = tx.send(SessionMessage::Event(SessionEvent::AudioLevels {
                            epoch,
                            levels,
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Audio level stream lagged by {} batches", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        // Local microphone energy stream.
        let mut my_level_rx = transport.my_audio_level();
        let tx = self.tx.clone();
        self.tasks.my_audio_level.set(tokio::spawn(async move {
            loop {
                match my_level_rx.recv().await {
                    Ok(level) => {
                        let _ = tx.send(SessionMessage::Event(SessionEvent::MyAudioLevel {
                            epoch,
                            level,
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        // One-shot join payload, then the join handshake.
        let signaling = self.deps.signaling.clone();
        let peer_id = self.deps.peer_id;
        let prefer_muted = self.deps.config.prefer_muted_on_join;
        let tx = self.tx.clone();
        self.tasks.request.set(tokio::spawn(async move {
            let joined = async {
                let (payload, local_ssrc) = transport.join_payload().await?;
                let result = signaling
                    .join_call(peer_id, info.id, info.access_hash, payload, prefer_muted)
                    .await?;
                Ok((result, local_ssrc))
            }
            .await;

            let event = match joined {
                Ok((result, local_ssrc)) => SessionEvent::Joined { epoch, result, local_ssrc },
                Err(error) => SessionEvent::JoinFailed { epoch, error },
            };
            let _ = tx.send(SessionMessage::Event(event));
        }));
    }

    /// `Active -> Established`: seed the SSRC map, hand the join response
    /// to the transport and build the roster context
    async fn enter_established(&mut self, result: JoinCallResult, local_ssrc: Ssrc) {
        let info = result.info;
        info!(
            "Session {}: established in call {} with {} (roster: {})",
            self.internal_id,
            info.id,
            local_ssrc,
            result.roster.participants.len()
        );
        self.internal_state = InternalState::Established { info, local_ssrc };

        self.ssrc_mapping.clear();
        let mut known_ssrcs = Vec::with_capacity(result.roster.participants.len());
        for participant in &result.roster.participants {
            self.ssrc_mapping.insert(participant.ssrc, participant.peer_id);
            known_ssrcs.push(participant.ssrc);
        }
        if let Some(transport) = &self.transport {
            transport.set_join_response(result.client_params.clone(), known_ssrcs).await;
        }

        let roster = ParticipantRosterContext::new(result.roster);
        let can_manage_call =
            roster.is_creator() || roster.admin_ids().contains(&self.deps.my_peer_id);
        let default_policy = roster.default_participants_are_muted();
        self.set_state(|state| {
            state.can_manage_call = can_manage_call;
            if can_manage_call && default_policy.can_change {
                state.default_participant_mute_state = Some(if default_policy.is_muted {
                    DefaultMuteState::Muted
                } else {
                    DefaultMuteState::Unmuted
                });
            }
        });
        self.roster = Some(roster);
        self.publish_members().await;

        if self.is_currently_connecting == Some(true) {
            self.start_liveness_probe();
        }
    }

    fn network_state_changed(&mut self, network_state: NetworkState) {
        self.set_state(|state| state.network_state = network_state);

        let is_connecting = network_state == NetworkState::Connecting;
        if self.is_currently_connecting != Some(is_connecting) {
            self.is_currently_connecting = Some(is_connecting);
            if is_connecting {
                self.start_liveness_probe();
            } else {
                // Cancelled the instant connectivity is back.
                self.tasks.liveness_probe.clear();
            }
        }
    }

    /// Single in-flight probe at a fixed interval while connecting; a
    /// definitive failure collapses the session back to `Requesting`
    fn start_liveness_probe(&mut self) {
        if self.tasks.liveness_probe.is_active() {
            return;
        }
        let InternalState::Established { info, local_ssrc } = self.internal_state else {
            return;
        };
        let epoch = self.epoch;
        let interval = self.deps.config.liveness_probe_interval;
        let signaling = self.deps.signaling.clone();
        let tx = self.tx.clone();
        debug!("Session {}: starting liveness probe for {}", self.internal_id, info.id);

        self.tasks.liveness_probe.set(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match signaling.liveness_probe(info.id, info.access_hash, local_ssrc).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        let _ =
                            tx.send(SessionMessage::Event(SessionEvent::LivenessLost { epoch }));
                        break;
                    }
                    Err(error) => {
                        // Transient; keep probing.
                        debug!("Liveness probe for {} errored: {}", info.id, error);
                    }
                }
            }
        }));
    }

    // ===== MEDIA STREAMS =====

    fn audio_levels_received(&mut self, levels: Vec<(Ssrc, f32)>) {
        // Translate SSRCs to peers; samples for sources we no longer know
        // (departed participants) are dropped.
        let mut translated: Vec<(PeerId, f32)> = Vec::with_capacity(levels.len());
        for (ssrc, level) in levels {
            if let Some(&peer_id) = self.ssrc_mapping.get(&ssrc) {
                translated.push((peer_id, level));
            }
        }
        if !translated.is_empty() {
            let _ = self.publishers.audio_levels.send(translated.clone());
        }

        let now = Instant::now().into_std();
        if self.speaking.update(&translated, now).is_some() {
            self.publish_members_sync();
        }
    }

    fn my_audio_level_received(&mut self, level: f32) {
        let _ = self.publishers.my_audio_level.send(level);

        let mapped = level * self.deps.config.my_level_gain;
        if mapped > self.deps.config.my_level_activity_threshold {
            self.last_loud_at = Some(Instant::now());
            if !self.tasks.my_level_tick.is_active() {
                self.start_my_level_tick();
            }
        }
    }

    fn start_my_level_tick(&mut self) {
        let epoch = self.epoch;
        let tick = self.deps.config.my_level_tick_interval;
        let tx = self.tx.clone();
        self.tasks.my_level_tick.set(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let _ = tx.send(SessionMessage::Event(SessionEvent::MyLevelTick { epoch }));
            }
        }));
    }

    /// Debounced edge detection for the outward "speaking" activity signal
    fn my_level_tick(&mut self) {
        let window = self.deps.config.my_level_activity_window;
        let active = self
            .last_loud_at
            .map(|at| Instant::now().saturating_duration_since(at) < window)
            .unwrap_or(false);

        if active != self.is_sending_activity {
            self.is_sending_activity = active;
            let signaling = self.deps.signaling.clone();
            let peer_id = self.deps.peer_id;
            tokio::spawn(async move {
                if let Err(error) = signaling.set_speaking_activity(peer_id, active).await {
                    debug!("Speaking activity update failed: {}", error);
                }
            });
        }
        if !active {
            // Quiet again; the next loud sample restarts the timer.
            self.tasks.my_level_tick.clear();
        }
    }

    /// The debounce tick is torn down with its transport; if the local
    /// user was still marked active, the inactive edge must go out now or
    /// it never will.
    fn reset_activity_signal(&mut self) {
        self.last_loud_at = None;
        if self.is_sending_activity {
            self.is_sending_activity = false;
            let signaling = self.deps.signaling.clone();
            let peer_id = self.deps.peer_id;
            tokio::spawn(async move {
                if let Err(error) = signaling.set_speaking_activity(peer_id, false).await {
                    debug!("Speaking activity update failed: {}", error);
                }
            });
        }
    }

    // ===== ROSTER =====

    fn spawn_roster_forwarder(&mut self) {
        let mut roster_rx = self.deps.signaling.roster_updates();
        let tx = self.tx.clone();
        self.tasks.roster_updates.set(tokio::spawn(async move {
            loop {
                match roster_rx.recv().await {
                    Ok((call_id, delta)) => {
                        let _ = tx.send(SessionMessage::Event(SessionEvent::RosterDelta {
                            call_id,
                            delta,
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Roster update stream lagged by {} deltas", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    async fn roster_delta_received(&mut self, call_id: CallId, delta: RosterDelta) {
        let established = matches!(
            self.internal_state,
            InternalState::Established { info, .. } if info.id == call_id
        );
        if !established {
            debug!("Dropping roster delta for inactive call {}", call_id);
            return;
        }
        if let Some(roster) = self.roster.as_mut() {
            roster.apply(delta);
            self.publish_members().await;
        }
    }

    // ===== PUBLISHING =====

    /// Rebuild and publish the merged membership view: roster, speaking
    /// set, SSRC rebinding and the local-participant mute reconciliation
    async fn publish_members(&mut self) {
        let Some(roster) = &self.roster else {
            return;
        };

        let mut force_transport_mute = false;
        let mut local_mute_state = self.state_value.mute_state;
        for participant in roster.participants() {
            // SSRC map is append/overwrite-only; rebinding covers rejoin
            // with a new transport source.
            self.ssrc_mapping.insert(participant.ssrc, participant.peer_id);

            if participant.peer_id == self.deps.my_peer_id {
                if let Some(mute_state) = participant.mute_state {
                    // The authoritative record wins over local intent.
                    local_mute_state = Some(mute_state);
                    force_transport_mute = true;
                } else if let Some(current) = local_mute_state {
                    if !current.can_unmute {
                        // Forced mute lifted by the roster; stay muted but
                        // unlocked until the user acts.
                        local_mute_state = Some(MuteState { can_unmute: true });
                        force_transport_mute = true;
                    }
                }
            }
        }

        let admin_ids = roster.admin_ids().clone();
        self.set_state(|state| {
            state.admin_ids = admin_ids;
            state.mute_state = local_mute_state;
        });
        if force_transport_mute {
            if let Some(transport) = &self.transport {
                transport.set_is_muted(true).await;
            }
        }

        self.publish_members_sync();
    }

    /// Publish membership and summary snapshots if they changed
    fn publish_members_sync(&mut self) {
        let Some(roster) = &self.roster else {
            return;
        };
        let members = GroupCallMembers {
            participants: roster.participants().to_vec(),
            speaking_peers: self.speaking.current().clone(),
            total_count: roster.total_count(),
            load_more_token: roster.load_more_token().map(str::to_owned),
        };
        if self.members_value.as_ref() != Some(&members) {
            self.members_value = Some(members.clone());
            self.publishers.members.send_replace(Some(members));
        }

        if let Some(info) = self.established_info() {
            let summary = GroupCallSummary {
                info,
                participant_count: roster.total_count(),
                call_state: self.state_value.clone(),
                top_participants: roster.top_participants(self.deps.config.top_participant_count),
                active_speaker_count: self.speaking.current().len(),
            };
            self.publishers.summary.send_if_modified(|current| {
                if current.as_ref() != Some(&summary) {
                    *current = Some(summary);
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Field-level update of the observed state; publishes only on change
    fn set_state(&mut self, update: impl FnOnce(&mut GroupCallState)) {
        let mut next = self.state_value.clone();
        update(&mut next);
        if next != self.state_value {
            self.state_value = next.clone();
            self.publishers.state.send_replace(next);
        }
    }

    fn complete_removal(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        info!("Session {} removed", self.internal_id);
        self.publishers.can_be_removed.send_replace(true);
    }

    fn established_info(&self) -> Option<GroupCallInfo> {
        match self.internal_state {
            InternalState::Established { info, .. } => Some(info),
            _ => None,
        }
    }
}
