//! Speaking-activity classification
//!
//! Converts raw per-participant audio energy samples into a debounced
//! "currently speaking" set. A participant above the energy threshold is
//! marked speaking immediately; once it drops below, a grace window keeps
//! it in the set so natural speech pauses do not make the indicator
//! flicker. A participant still delivering (quiet) samples gets the longer
//! silent window; a participant that stopped delivering samples entirely
//! gets the short cutoff window.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::config::CallConfig;
use crate::types::PeerId;

#[derive(Debug, Clone, Copy)]
struct SpeakingEntry {
    last_above_threshold: Instant,
}

/// Debounced classifier for the set of audibly speaking participants
#[derive(Debug)]
pub struct SpeakingActivityTracker {
    threshold: f32,
    cutoff_timeout: std::time::Duration,
    silent_timeout: std::time::Duration,
    entries: HashMap<PeerId, SpeakingEntry>,
    current: HashSet<PeerId>,
}

impl SpeakingActivityTracker {
    pub fn new(config: &CallConfig) -> Self {
        Self {
            threshold: config.speaking_level_threshold,
            cutoff_timeout: config.speaking_cutoff_timeout,
            silent_timeout: config.speaking_silent_timeout,
            entries: HashMap::new(),
            current: HashSet::new(),
        }
    }

    /// The set as of the last update
    pub fn current(&self) -> &HashSet<PeerId> {
        &self.current
    }

    /// Feed one batch of `(peer, energy)` samples.
    ///
    /// Returns `Some(set)` only when the resulting speaking set differs
    /// from the previously returned one; identical consecutive outputs are
    /// suppressed.
    pub fn update(
        &mut self,
        levels: &[(PeerId, f32)],
        now: Instant,
    ) -> Option<HashSet<PeerId>> {
        let mut retained: HashMap<PeerId, SpeakingEntry> = HashMap::new();
        let mut quiet_this_batch: HashSet<PeerId> = HashSet::new();
        let mut speaking: HashSet<PeerId> = HashSet::new();

        for &(peer_id, level) in levels {
            if level > self.threshold {
                retained.insert(peer_id, SpeakingEntry { last_above_threshold: now });
                speaking.insert(peer_id);
            } else {
                quiet_this_batch.insert(peer_id);
            }
        }

        // Participants not loud in this batch stay speaking while inside
        // their grace window.
        for (&peer_id, entry) in &self.entries {
            if retained.contains_key(&peer_id) {
                continue;
            }
            let elapsed = now.saturating_duration_since(entry.last_above_threshold);
            let window = if quiet_this_batch.contains(&peer_id) {
                self.silent_timeout
            } else {
                self.cutoff_timeout
            };
            if elapsed < window {
                retained.insert(peer_id, *entry);
                speaking.insert(peer_id);
            }
        }

        self.entries = retained;
        if speaking != self.current {
            self.current = speaking.clone();
            Some(speaking)
        } else {
            None
        }
    }
}
