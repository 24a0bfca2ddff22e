//! Session configuration
//!
//! All tunables of the coordination layer live here so tests can tighten
//! the timing windows without touching the state machine.

use std::time::Duration;

/// Configuration for one group-call session
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Energy level above which a participant counts as speaking
    pub speaking_level_threshold: f32,
    /// Grace window before a continuously-loud participant is cleared
    pub speaking_cutoff_timeout: Duration,
    /// Longer grace window for participants with intermittent activity
    pub speaking_silent_timeout: Duration,
    /// Interval between liveness probes while the media path is connecting
    pub liveness_probe_interval: Duration,
    /// Cadence of the local audio-level debounce timer
    pub my_level_tick_interval: Duration,
    /// How long after the last loud sample the local user counts as active
    pub my_level_activity_window: Duration,
    /// Energy level above which the local user counts as active
    pub my_level_activity_threshold: f32,
    /// Gain applied to the raw local level before debouncing
    pub my_level_gain: f32,
    /// Number of participants surfaced as `top_participants`
    pub top_participant_count: usize,
    /// Whether the join handshake asks the server to start us muted
    pub prefer_muted_on_join: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            speaking_level_threshold: 0.15,
            speaking_cutoff_timeout: Duration::from_secs(1),
            speaking_silent_timeout: Duration::from_secs(3),
            liveness_probe_interval: Duration::from_secs(4),
            my_level_tick_interval: Duration::from_millis(100),
            my_level_activity_window: Duration::from_secs(1),
            my_level_activity_threshold: 0.01,
            my_level_gain: 1.5,
            top_participant_count: 3,
            prefer_muted_on_join: true,
        }
    }
}
