//! Boundary to the platform playback subsystem.
//!
//! The voice manager never talks to an audio device directly. It dispatches
//! shared buffers onto numbered channels of a fixed-size pool through the
//! [`Mixer`] trait. Dispatch is fire-and-forget: the mixer plays the buffer
//! on its own time and the caller only polls whether a channel is busy.

use super::synth::SampleBuffer;
use crate::error::MixerError;
use std::sync::Arc;
use std::time::Duration;

/// Index of a channel in the mixer's pool.
pub type ChannelId = usize;

/// A fixed pool of playback channels.
///
/// Implementations must be callable from any thread.
pub trait Mixer: Send + Sync {
    /// Number of channels in the pool.
    fn channel_count(&self) -> usize;

    /// Whether `channel` is currently producing sound.
    fn is_busy(&self, channel: ChannelId) -> bool;

    /// Starts `buffer` on an idle `channel`.
    ///
    /// If `limit` is given, playback stops after that long even if the
    /// buffer is longer. Returns [`MixerError::ChannelBusy`] if the channel
    /// is still playing; callers pick channels with [`find_idle`](Self::find_idle).
    fn play(
        &self,
        channel: ChannelId,
        buffer: Arc<SampleBuffer>,
        limit: Option<Duration>,
    ) -> Result<(), MixerError>;

    /// Fades `channel` to silence over `fade` and then stops it.
    ///
    /// Returns [`MixerError::ChannelIdle`] if the channel already finished.
    fn fade_out(&self, channel: ChannelId, fade: Duration) -> Result<(), MixerError>;

    /// Silences every channel immediately.
    fn stop_all(&self);

    /// Returns the first idle channel, if any.
    fn find_idle(&self) -> Option<ChannelId> {
        (0..self.channel_count()).find(|&channel| !self.is_busy(channel))
    }
}
