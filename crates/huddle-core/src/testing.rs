//! Scriptable collaborator fakes shared by the session and supervisor
//! tests. Every backend interaction is recorded so tests can assert on
//! exact request counts and payloads.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::errors::{CallError, Result};
use crate::media::{MediaTransport, MediaTransportFactory};
use crate::roster::RosterDelta;
use crate::signaling::{JoinCallResult, SignalingClient};
use crate::types::{
    CallId, DefaultMutePolicy, GroupCallInfo, MuteState, NetworkState, Participant, PeerId,
    RosterState, Ssrc,
};

/// Opt-in log output for test debugging, controlled by `RUST_LOG`
pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn participant(peer_id: i64, ssrc: u32) -> Participant {
    Participant {
        peer_id: PeerId(peer_id),
        ssrc: Ssrc(ssrc),
        mute_state: None,
        is_admin: false,
        activity_level: 0.0,
    }
}

pub(crate) fn roster_with(participants: Vec<Participant>) -> RosterState {
    let total_count = participants.len();
    RosterState {
        participants,
        total_count,
        admin_ids: Default::default(),
        is_creator: false,
        default_participants_are_muted: DefaultMutePolicy { is_muted: false, can_change: false },
        next_fetch_offset: None,
    }
}

// ===== SIGNALING =====

pub(crate) struct MockSignaling {
    pub info: GroupCallInfo,
    /// `lookup_active_call` returns `Ok(None)` while set
    pub lookup_gone: AtomicBool,
    /// Roster snapshot handed back by `join_call`
    pub join_roster: Mutex<RosterState>,
    /// Scripted probe answers, consumed front to back; `Ok(true)` after
    pub probe_script: Mutex<VecDeque<Result<bool>>>,
    /// Forced failure for `terminate_call`
    pub fail_terminate: AtomicBool,

    pub lookup_count: AtomicUsize,
    pub create_count: AtomicUsize,
    pub join_count: AtomicUsize,
    pub leave_count: AtomicUsize,
    pub terminate_count: AtomicUsize,
    pub probe_count: AtomicUsize,
    pub invites: Mutex<Vec<PeerId>>,
    pub mute_updates: Mutex<Vec<(PeerId, Option<MuteState>)>>,
    pub default_policy_updates: Mutex<Vec<bool>>,
    pub activity_reports: Mutex<Vec<(PeerId, bool)>>,
    pub joined_muted: Mutex<Vec<bool>>,

    roster_tx: broadcast::Sender<(CallId, RosterDelta)>,
}

impl MockSignaling {
    pub fn new(info: GroupCallInfo) -> Arc<Self> {
        let (roster_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            info,
            lookup_gone: AtomicBool::new(false),
            join_roster: Mutex::new(roster_with(Vec::new())),
            probe_script: Mutex::new(VecDeque::new()),
            fail_terminate: AtomicBool::new(false),
            lookup_count: AtomicUsize::new(0),
            create_count: AtomicUsize::new(0),
            join_count: AtomicUsize::new(0),
            leave_count: AtomicUsize::new(0),
            terminate_count: AtomicUsize::new(0),
            probe_count: AtomicUsize::new(0),
            invites: Mutex::new(Vec::new()),
            mute_updates: Mutex::new(Vec::new()),
            default_policy_updates: Mutex::new(Vec::new()),
            activity_reports: Mutex::new(Vec::new()),
            joined_muted: Mutex::new(Vec::new()),
            roster_tx,
        })
    }

    /// Push a roster delta as if the backend had sent it
    pub fn push_delta(&self, call_id: CallId, delta: RosterDelta) {
        let _ = self.roster_tx.send((call_id, delta));
    }
}

#[async_trait]
impl SignalingClient for MockSignaling {
    async fn lookup_active_call(
        &self,
        _call_id: CallId,
        _access_hash: u64,
    ) -> Result<Option<GroupCallInfo>> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        if self.lookup_gone.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(self.info))
        }
    }

    async fn create_call(&self, _peer_id: PeerId) -> Result<GroupCallInfo> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.info)
    }

    async fn join_call(
        &self,
        _peer_id: PeerId,
        _call_id: CallId,
        _access_hash: u64,
        _join_payload: String,
        prefer_muted: bool,
    ) -> Result<JoinCallResult> {
        self.join_count.fetch_add(1, Ordering::SeqCst);
        self.joined_muted.lock().unwrap().push(prefer_muted);
        Ok(JoinCallResult {
            info: self.info,
            client_params: "{\"transport\":\"test\"}".to_string(),
            roster: self.join_roster.lock().unwrap().clone(),
        })
    }

    async fn leave_call(
        &self,
        _call_id: CallId,
        _access_hash: u64,
        _source_ssrc: Ssrc,
    ) -> Result<()> {
        self.leave_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate_call(&self, _call_id: CallId, _access_hash: u64) -> Result<()> {
        self.terminate_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminate.load(Ordering::SeqCst) {
            Err(CallError::signaling("terminate rejected"))
        } else {
            Ok(())
        }
    }

    async fn invite_to_call(
        &self,
        _call_id: CallId,
        _access_hash: u64,
        peer_id: PeerId,
    ) -> Result<()> {
        self.invites.lock().unwrap().push(peer_id);
        Ok(())
    }

    async fn update_participant_mute(
        &self,
        _call_id: CallId,
        _access_hash: u64,
        peer_id: PeerId,
        mute_state: Option<MuteState>,
    ) -> Result<()> {
        self.mute_updates.lock().unwrap().push((peer_id, mute_state));
        Ok(())
    }

    async fn update_default_mute_policy(
        &self,
        _call_id: CallId,
        _access_hash: u64,
        is_muted: bool,
    ) -> Result<()> {
        self.default_policy_updates.lock().unwrap().push(is_muted);
        Ok(())
    }

    async fn liveness_probe(&self, _call_id: CallId, _access_hash: u64, _ssrc: Ssrc) -> Result<bool> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.probe_script.lock().unwrap().pop_front().unwrap_or(Ok(true))
    }

    fn roster_updates(&self) -> broadcast::Receiver<(CallId, RosterDelta)> {
        self.roster_tx.subscribe()
    }

    async fn set_speaking_activity(&self, peer_id: PeerId, active: bool) -> Result<()> {
        self.activity_reports.lock().unwrap().push((peer_id, active));
        Ok(())
    }
}

// ===== MEDIA =====

pub(crate) struct MockTransport {
    local_ssrc: Ssrc,
    network_tx: watch::Sender<NetworkState>,
    levels_tx: broadcast::Sender<Vec<(Ssrc, f32)>>,
    my_level_tx: broadcast::Sender<f32>,

    pub join_response: Mutex<Option<(String, Vec<Ssrc>)>>,
    pub mute_history: Mutex<Vec<bool>>,
    pub audio_inputs: Mutex<Vec<String>>,
    pub audio_outputs: Mutex<Vec<String>>,
    pub stopped: AtomicBool,
}

impl MockTransport {
    pub fn new(local_ssrc: Ssrc) -> Arc<Self> {
        let (network_tx, _) = watch::channel(NetworkState::Connecting);
        let (levels_tx, _) = broadcast::channel(64);
        let (my_level_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            local_ssrc,
            network_tx,
            levels_tx,
            my_level_tx,
            join_response: Mutex::new(None),
            mute_history: Mutex::new(Vec::new()),
            audio_inputs: Mutex::new(Vec::new()),
            audio_outputs: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn set_network_state(&self, state: NetworkState) {
        self.network_tx.send_replace(state);
    }

    pub fn emit_audio_levels(&self, levels: Vec<(Ssrc, f32)>) {
        let _ = self.levels_tx.send(levels);
    }

    pub fn emit_my_level(&self, level: f32) {
        let _ = self.my_level_tx.send(level);
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn join_payload(&self) -> Result<(String, Ssrc)> {
        Ok(("{\"ufrag\":\"test\"}".to_string(), self.local_ssrc))
    }

    async fn set_join_response(&self, client_params: String, known_ssrcs: Vec<Ssrc>) {
        *self.join_response.lock().unwrap() = Some((client_params, known_ssrcs));
    }

    fn network_state(&self) -> watch::Receiver<NetworkState> {
        self.network_tx.subscribe()
    }

    fn audio_levels(&self) -> broadcast::Receiver<Vec<(Ssrc, f32)>> {
        self.levels_tx.subscribe()
    }

    fn my_audio_level(&self) -> broadcast::Receiver<f32> {
        self.my_level_tx.subscribe()
    }

    async fn set_is_muted(&self, muted: bool) {
        self.mute_history.lock().unwrap().push(muted);
    }

    async fn switch_audio_input(&self, device_id: String) {
        self.audio_inputs.lock().unwrap().push(device_id);
    }

    async fn switch_audio_output(&self, device_id: String) {
        self.audio_outputs.lock().unwrap().push(device_id);
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Hands out one [`MockTransport`] per acquisition and keeps them all for
/// inspection
pub(crate) struct MockTransportFactory {
    next_ssrc: AtomicU32,
    pub transports: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new(first_ssrc: u32) -> Arc<Self> {
        Arc::new(Self { next_ssrc: AtomicU32::new(first_ssrc), transports: Mutex::new(Vec::new()) })
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.transports.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.transports.lock().unwrap().len()
    }
}

impl MediaTransportFactory for MockTransportFactory {
    fn create_transport(&self) -> Arc<dyn MediaTransport> {
        let ssrc = Ssrc(self.next_ssrc.fetch_add(1, Ordering::SeqCst));
        let transport = MockTransport::new(ssrc);
        self.transports.lock().unwrap().push(transport.clone());
        transport
    }
}
