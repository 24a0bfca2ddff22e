//! Participant roster for one established session
//!
//! Owns the authoritative, mutation-ordered participant collection and
//! merges the ordered delta stream delivered by the signaling backend.
//! Deltas are idempotent per participant (last-writer-wins keyed by peer
//! identity); a delta for an unknown peer degrades to a no-op instead of
//! erroring. Arrival order is preserved across in-place updates so the
//! `top_participants` view stays stable.

use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{DefaultMutePolicy, Participant, PeerId, RosterState};

/// Incremental change to the authoritative participant list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosterDelta {
    /// Replace the whole roster with a fresh snapshot
    Resync(RosterState),
    /// Add a participant, or update it in place if already present
    Upsert(Participant),
    /// Remove a participant; unknown peers are ignored
    Remove(PeerId),
    /// Correct the server-declared total
    SetTotalCount(usize),
    /// Change the default mute-on-join policy
    SetDefaultMutePolicy(DefaultMutePolicy),
    /// Replace the incremental-loading continuation token
    SetLoadMoreToken(Option<String>),
}

/// Authoritative participant collection for one call
#[derive(Debug, Clone)]
pub struct ParticipantRosterContext {
    participants: Vec<Participant>,
    index: HashMap<PeerId, usize>,
    total_count: usize,
    admin_ids: HashSet<PeerId>,
    is_creator: bool,
    default_participants_are_muted: DefaultMutePolicy,
    load_more_token: Option<String>,
}

impl ParticipantRosterContext {
    pub fn new(initial: RosterState) -> Self {
        let mut context = Self {
            participants: Vec::new(),
            index: HashMap::new(),
            total_count: 0,
            admin_ids: HashSet::new(),
            is_creator: false,
            default_participants_are_muted: DefaultMutePolicy { is_muted: false, can_change: false },
            load_more_token: None,
        };
        context.resync(initial);
        context
    }

    /// Apply one delta in delivery order
    pub fn apply(&mut self, delta: RosterDelta) {
        match delta {
            RosterDelta::Resync(state) => self.resync(state),
            RosterDelta::Upsert(participant) => self.upsert(participant),
            RosterDelta::Remove(peer_id) => self.remove(peer_id),
            RosterDelta::SetTotalCount(count) => self.total_count = count,
            RosterDelta::SetDefaultMutePolicy(policy) => {
                self.default_participants_are_muted = policy;
            }
            RosterDelta::SetLoadMoreToken(token) => self.load_more_token = token,
        }
    }

    fn resync(&mut self, state: RosterState) {
        self.participants.clear();
        self.index.clear();
        for participant in state.participants {
            self.upsert(participant);
        }
        self.total_count = state.total_count;
        self.admin_ids = state.admin_ids;
        self.is_creator = state.is_creator;
        self.default_participants_are_muted = state.default_participants_are_muted;
        self.load_more_token = state.next_fetch_offset;
    }

    fn upsert(&mut self, participant: Participant) {
        if participant.is_admin {
            self.admin_ids.insert(participant.peer_id);
        } else {
            self.admin_ids.remove(&participant.peer_id);
        }
        match self.index.get(&participant.peer_id) {
            Some(&position) => {
                // Last writer wins, arrival order preserved.
                self.participants[position] = participant;
            }
            None => {
                self.index.insert(participant.peer_id, self.participants.len());
                self.participants.push(participant);
                self.total_count += 1;
            }
        }
    }

    fn remove(&mut self, peer_id: PeerId) {
        let Some(position) = self.index.remove(&peer_id) else {
            debug!("Roster remove for unknown {}, ignoring", peer_id);
            return;
        };
        self.participants.remove(position);
        for entry in self.index.values_mut() {
            if *entry > position {
                *entry -= 1;
            }
        }
        self.admin_ids.remove(&peer_id);
        self.total_count = self.total_count.saturating_sub(1);
    }

    /// All materialized participants in arrival order
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, peer_id: PeerId) -> Option<&Participant> {
        self.index.get(&peer_id).map(|&position| &self.participants[position])
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.index.contains_key(&peer_id)
    }

    /// Server-declared total, never below what is materialized locally
    pub fn total_count(&self) -> usize {
        self.total_count.max(self.participants.len())
    }

    /// First `n` participants by arrival order
    pub fn top_participants(&self, n: usize) -> Vec<Participant> {
        self.participants.iter().take(n).cloned().collect()
    }

    pub fn admin_ids(&self) -> &HashSet<PeerId> {
        &self.admin_ids
    }

    pub fn is_creator(&self) -> bool {
        self.is_creator
    }

    pub fn default_participants_are_muted(&self) -> DefaultMutePolicy {
        self.default_participants_are_muted
    }

    pub fn load_more_token(&self) -> Option<&str> {
        self.load_more_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MuteState, Ssrc};

    fn participant(id: i64, ssrc: u32) -> Participant {
        Participant {
            peer_id: PeerId(id),
            ssrc: Ssrc(ssrc),
            mute_state: None,
            is_admin: false,
            activity_level: 0.0,
        }
    }

    fn initial_state(participants: Vec<Participant>, total: usize) -> RosterState {
        RosterState {
            participants,
            total_count: total,
            admin_ids: HashSet::new(),
            is_creator: false,
            default_participants_are_muted: DefaultMutePolicy { is_muted: false, can_change: false },
            next_fetch_offset: None,
        }
    }

    #[test]
    fn last_writer_wins_per_peer() {
        let mut roster =
            ParticipantRosterContext::new(initial_state(vec![participant(1, 10)], 1));

        let mut updated = participant(1, 20);
        updated.mute_state = Some(MuteState { can_unmute: false });
        roster.apply(RosterDelta::Upsert(updated.clone()));

        assert_eq!(roster.participants().len(), 1);
        assert_eq!(roster.participant(PeerId(1)), Some(&updated));
        assert_eq!(roster.total_count(), 1);
    }

    #[test]
    fn total_count_is_server_declared() {
        let roster = ParticipantRosterContext::new(initial_state(
            vec![participant(1, 10), participant(2, 11)],
            250,
        ));
        assert_eq!(roster.total_count(), 250);
        assert_eq!(roster.participants().len(), 2);
    }

    #[test]
    fn resync_twice_is_idempotent() {
        let state = initial_state(vec![participant(1, 10), participant(2, 11)], 2);
        let mut roster = ParticipantRosterContext::new(state.clone());

        roster.apply(RosterDelta::Resync(state.clone()));
        let first: Vec<_> = roster.participants().to_vec();
        let first_total = roster.total_count();

        roster.apply(RosterDelta::Resync(state));
        assert_eq!(roster.participants(), first.as_slice());
        assert_eq!(roster.total_count(), first_total);
    }

    #[test]
    fn unknown_peer_removal_is_ignored() {
        let mut roster =
            ParticipantRosterContext::new(initial_state(vec![participant(1, 10)], 1));
        roster.apply(RosterDelta::Remove(PeerId(99)));
        assert_eq!(roster.participants().len(), 1);
        assert_eq!(roster.total_count(), 1);
    }

    #[test]
    fn removal_keeps_arrival_order_and_index() {
        let mut roster = ParticipantRosterContext::new(initial_state(
            vec![participant(1, 10), participant(2, 11), participant(3, 12)],
            3,
        ));
        roster.apply(RosterDelta::Remove(PeerId(2)));

        assert_eq!(
            roster.participants().iter().map(|p| p.peer_id).collect::<Vec<_>>(),
            vec![PeerId(1), PeerId(3)]
        );
        assert_eq!(roster.participant(PeerId(3)).unwrap().ssrc, Ssrc(12));
        assert_eq!(roster.total_count(), 2);
    }

    #[test]
    fn duplicate_add_degrades_to_update() {
        let mut roster =
            ParticipantRosterContext::new(initial_state(vec![participant(1, 10)], 1));
        roster.apply(RosterDelta::Upsert(participant(1, 10)));
        assert_eq!(roster.participants().len(), 1);
        assert_eq!(roster.total_count(), 1);
    }

    #[test]
    fn admin_flag_tracks_upserts() {
        let mut roster =
            ParticipantRosterContext::new(initial_state(vec![participant(1, 10)], 1));
        let mut admin = participant(1, 10);
        admin.is_admin = true;
        roster.apply(RosterDelta::Upsert(admin.clone()));
        assert!(roster.admin_ids().contains(&PeerId(1)));

        admin.is_admin = false;
        roster.apply(RosterDelta::Upsert(admin));
        assert!(!roster.admin_ids().contains(&PeerId(1)));
    }

    #[test]
    fn top_participants_follow_arrival_order() {
        let mut roster = ParticipantRosterContext::new(initial_state(
            vec![participant(1, 10), participant(2, 11), participant(3, 12)],
            3,
        ));
        roster.apply(RosterDelta::Upsert(participant(4, 13)));

        let top = roster.top_participants(3);
        assert_eq!(
            top.iter().map(|p| p.peer_id).collect::<Vec<_>>(),
            vec![PeerId(1), PeerId(2), PeerId(3)]
        );
    }
}
