//! Real audio output through rodio.
//!
//! Each pool channel is a rodio [`Sink`]. Buffers are streamed into a sink
//! by [`BufferSource`], which reads the shared bank buffer without copying
//! it and watches an atomic fade control so a release can ramp the voice
//! down from another thread.

use super::mixer::{ChannelId, Mixer};
use super::synth::SampleBuffer;
use crate::error::MixerError;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fade state shared between a channel and the source it is playing.
/// Zero means "not fading"; otherwise the fade length in frames.
#[derive(Debug, Default)]
struct FadeControl {
    frames: AtomicUsize,
}

/// Audio source over a shared [`SampleBuffer`].
/// Implements rodio's Source trait for playback.
struct BufferSource {
    buffer: Arc<SampleBuffer>,
    /// Frame index to stop at (buffer length or the duration limit).
    end: usize,
    /// Current frame.
    pos: usize,
    /// Current channel within the frame (0 = left, 1 = right).
    channel: usize,
    fade: Arc<FadeControl>,
    /// Frame at which the fade began and its length, once observed.
    fading: Option<(usize, usize)>,
}

impl BufferSource {
    fn new(buffer: Arc<SampleBuffer>, limit: Option<Duration>, fade: Arc<FadeControl>) -> Self {
        let end = match limit {
            Some(limit) => buffer.frames_for(limit),
            None => buffer.len(),
        };
        Self {
            buffer,
            end,
            pos: 0,
            channel: 0,
            fade,
            fading: None,
        }
    }

    /// Gain for the current frame, or `None` once a fade has completed.
    fn gain(&mut self) -> Option<f32> {
        if self.fading.is_none() {
            let frames = self.fade.frames.load(Ordering::Relaxed);
            if frames > 0 {
                self.fading = Some((self.pos, frames));
            }
        }
        match self.fading {
            None => Some(1.0),
            Some((start, frames)) => {
                let elapsed = self.pos - start;
                (elapsed < frames).then(|| 1.0 - elapsed as f32 / frames as f32)
            }
        }
    }
}

impl Iterator for BufferSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.pos >= self.end {
            return None;
        }
        let gain = self.gain()?;
        let sample = self.buffer.frames()[self.pos][self.channel];

        // Advance to next channel/frame
        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.pos += 1;
        }

        if gain >= 1.0 {
            Some(sample)
        } else {
            Some((sample as f32 * gain) as i16)
        }
    }
}

impl Source for BufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Parameters never change mid-buffer
    }

    fn channels(&self) -> u16 {
        2 // Stereo
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        let rate = self.buffer.sample_rate().max(1) as f64;
        Some(Duration::from_secs_f64(self.end as f64 / rate))
    }
}

/// One pool channel: a sink plus the fade control of its current source.
struct Channel {
    sink: Sink,
    fade: Mutex<Arc<FadeControl>>,
}

/// [`Mixer`] backed by rodio sinks on a shared output stream.
pub struct RodioMixer {
    channels: Vec<Channel>,
    sample_rate: u32,
}

impl RodioMixer {
    /// Creates `channels` sinks on the given output.
    ///
    /// # Errors
    ///
    /// Returns error if a sink cannot be attached to the output.
    pub fn new(
        handle: &OutputStreamHandle,
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, MixerError> {
        let channels = (0..channels)
            .map(|_| {
                Sink::try_new(handle)
                    .map(|sink| Channel {
                        sink,
                        fade: Mutex::new(Arc::new(FadeControl::default())),
                    })
                    .map_err(|e| MixerError::Output(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    fn channel(&self, channel: ChannelId) -> Result<&Channel, MixerError> {
        self.channels
            .get(channel)
            .ok_or(MixerError::ChannelOutOfRange(channel))
    }
}

impl Mixer for RodioMixer {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn is_busy(&self, channel: ChannelId) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|c| !c.sink.empty())
    }

    fn play(
        &self,
        channel: ChannelId,
        buffer: Arc<SampleBuffer>,
        limit: Option<Duration>,
    ) -> Result<(), MixerError> {
        let slot = self.channel(channel)?;
        // Appending to a sink that is still draining blocks until it empties
        if !slot.sink.empty() {
            return Err(MixerError::ChannelBusy(channel));
        }
        let fade = Arc::new(FadeControl::default());
        *slot.fade.lock().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fade);

        slot.sink.append(BufferSource::new(buffer, limit, fade));
        slot.sink.play();
        Ok(())
    }

    fn fade_out(&self, channel: ChannelId, fade: Duration) -> Result<(), MixerError> {
        let slot = self.channel(channel)?;
        if slot.sink.empty() {
            return Err(MixerError::ChannelIdle(channel));
        }
        let frames = ((fade.as_secs_f64() * self.sample_rate as f64) as usize).max(1);
        slot.fade
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .store(frames, Ordering::Relaxed);
        Ok(())
    }

    fn stop_all(&self) {
        for channel in &self.channels {
            channel.sink.stop();
        }
    }
}

/// An open audio device together with its channel pool.
///
/// The stream must stay alive for as long as anything plays, so it is
/// owned here rather than by the mixer (the stream is not `Send`).
pub struct AudioOutput {
    _stream: OutputStream,
    mixer: Arc<RodioMixer>,
}

impl AudioOutput {
    /// Opens the default output device with a pool of `channels` sinks.
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available.
    pub fn open_default(channels: usize, sample_rate: u32) -> Result<Self, MixerError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| MixerError::Output(e.to_string()))?;
        let mixer = RodioMixer::new(&handle, channels, sample_rate)?;
        Ok(Self {
            _stream: stream,
            mixer: Arc::new(mixer),
        })
    }

    /// The channel pool, ready to hand to the engine.
    pub fn mixer(&self) -> Arc<dyn Mixer> {
        Arc::clone(&self.mixer) as Arc<dyn Mixer>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_buffer(frames: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::from_frames(
            1000,
            (0..frames).map(|_| [1000, -1000]).collect(),
        ))
    }

    #[test]
    fn test_source_interleaves_stereo() {
        let source = BufferSource::new(flat_buffer(3), None, Arc::default());
        let samples: Vec<i16> = source.collect();
        assert_eq!(samples, vec![1000, -1000, 1000, -1000, 1000, -1000]);
    }

    #[test]
    fn test_source_respects_limit() {
        // 1000 Hz: 4 ms = 4 frames
        let source = BufferSource::new(
            flat_buffer(100),
            Some(Duration::from_millis(4)),
            Arc::default(),
        );
        assert_eq!(source.count(), 8);
    }

    #[test]
    fn test_source_fades_then_ends() {
        let fade = Arc::new(FadeControl::default());
        let mut source = BufferSource::new(flat_buffer(100), None, Arc::clone(&fade));
        // Two full-gain frames
        for _ in 0..4 {
            assert_eq!(source.next().unwrap().abs(), 1000);
        }
        fade.frames.store(4, Ordering::Relaxed);
        let rest: Vec<i16> = source.collect();
        // Four fading frames, then the source is exhausted
        assert_eq!(rest.len(), 8);
        assert_eq!(rest[0], 1000);
        assert_eq!(rest[2], 750);
        assert_eq!(rest[6], 250);
    }
}
