//! Media transport collaborator seam
//!
//! The transport owns the codec pipeline, jitter buffer and connectivity;
//! the session only consumes its streams and pushes mute/device changes.
//! One transport instance serves exactly one `Requesting -> Active`
//! transition; reconnection allocates a fresh one through the factory.

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::errors::Result;
use crate::types::{NetworkState, Ssrc};

/// Operations the coordinator consumes from the media engine
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Produce the local join payload and source SSRC (one-shot)
    async fn join_payload(&self) -> Result<(String, Ssrc)>;

    /// Hand the server-assigned client parameters and known sources to the
    /// transport once the join handshake succeeded
    async fn set_join_response(&self, client_params: String, known_ssrcs: Vec<Ssrc>);

    /// Media-path connectivity
    fn network_state(&self) -> watch::Receiver<NetworkState>;

    /// Per-source audio energy samples at audio-frame cadence
    fn audio_levels(&self) -> broadcast::Receiver<Vec<(Ssrc, f32)>>;

    /// Local microphone energy samples
    fn my_audio_level(&self) -> broadcast::Receiver<f32>;

    /// Mute or unmute the local capture path
    async fn set_is_muted(&self, muted: bool);

    /// Switch the capture device
    async fn switch_audio_input(&self, device_id: String);

    /// Switch the playback device
    async fn switch_audio_output(&self, device_id: String);

    /// Tear the transport down; no stream emits after this returns
    async fn stop(&self);
}

/// Allocates one transport per call acquisition attempt
pub trait MediaTransportFactory: Send + Sync {
    fn create_transport(&self) -> std::sync::Arc<dyn MediaTransport>;
}
