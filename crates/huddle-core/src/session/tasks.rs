//! Request-task ownership
//!
//! Each class of supersedable in-flight work (call request, join
//! handshake, leave, liveness probe, stream forwarders, timers) owns
//! exactly one [`TaskSlot`]. Setting a slot aborts whatever was running
//! in it before, so starting a new request of a class implicitly cancels
//! the previous one, and dropping the owning structure cancels everything
//! outstanding. Fire-and-forget requests (invites, mute updates) are
//! deliberately not slotted; aborting them would lose acknowledged work.

use tokio::task::JoinHandle;

/// Holder for at most one cancelable task
#[derive(Debug, Default)]
pub(crate) struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Replace the slot's task, aborting the previous one
    pub fn set(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.handle.replace(handle) {
            previous.abort();
        }
    }

    /// Abort and empty the slot
    pub fn clear(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

/// The session's full set of task slots, aborted as one batch on teardown
#[derive(Debug, Default)]
pub(crate) struct TaskBag {
    /// Call lookup/create and the join handshake
    pub request: TaskSlot,
    /// Leave/terminate request
    pub leave: TaskSlot,
    /// Liveness probe loop
    pub liveness_probe: TaskSlot,
    /// Network-state stream forwarder
    pub network_state: TaskSlot,
    /// Audio-levels stream forwarder
    pub audio_levels: TaskSlot,
    /// Local-level stream forwarder
    pub my_audio_level: TaskSlot,
    /// Local-level debounce tick
    pub my_level_tick: TaskSlot,
    /// Roster delta stream forwarder (lives for the whole session)
    pub roster_updates: TaskSlot,
}

impl TaskBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort every outstanding task and timer
    pub fn clear_all(&mut self) {
        self.request.clear();
        self.leave.clear();
        self.liveness_probe.clear();
        self.network_state.clear();
        self.audio_levels.clear();
        self.my_audio_level.clear();
        self.my_level_tick.clear();
        self.roster_updates.clear();
    }

    /// Abort everything bound to the media transport of the current epoch
    pub fn clear_transport_bound(&mut self) {
        self.network_state.clear();
        self.audio_levels.clear();
        self.my_audio_level.clear();
        self.my_level_tick.clear();
        self.liveness_probe.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setting_a_slot_aborts_the_previous_task() {
        let mut slot = TaskSlot::new();
        let (mut tx, rx) = tokio::sync::oneshot::channel::<()>();

        slot.set(tokio::spawn(async move {
            // Held open until aborted.
            let _ = rx.await;
        }));
        assert!(slot.is_active());

        slot.set(tokio::spawn(async {}));
        // The first task's receiver is dropped by abort, so the sender
        // observes closure.
        tx.closed().await;
    }

    #[tokio::test]
    async fn clear_all_stops_every_slot() {
        let mut bag = TaskBag::new();
        bag.request.set(tokio::spawn(std::future::pending()));
        bag.liveness_probe.set(tokio::spawn(std::future::pending()));
        bag.clear_all();
        assert!(!bag.request.is_active());
        assert!(!bag.liveness_probe.is_active());
    }
}
