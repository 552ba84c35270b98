//! Audio export functionality.
//!
//! Bounces one full pass over the sequencer grid to a WAV file by mixing
//! the voice bank's buffers offline, the same way the live transport would
//! trigger them.

use crate::audio::bank::VoiceBank;
use crate::sequencer::{column_interval, Sequence};
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Frames written between progress callbacks.
const PROGRESS_CHUNK: usize = 4096;

/// Mixes one grid cycle of `sequence` into interleaved-ready stereo frames.
///
/// Events starting at or beyond `grid_width` never fire and are skipped,
/// as are events whose instrument the bank lacks. The result runs to the
/// end of the grid or of the last sounding voice, whichever is later.
///
/// # Arguments
///
/// * `sequence` - Events to render
/// * `bank` - Source of note buffers (also fixes the sample rate)
/// * `tempo` - Beats per minute
/// * `grid_width` - Number of columns in one cycle
pub fn render_sequence(
    sequence: &Sequence,
    bank: &VoiceBank,
    tempo: u32,
    grid_width: u32,
) -> Vec<[i16; 2]> {
    let rate = bank.settings().sample_rate as f64;
    let interval = column_interval(tempo);
    let column_frames = interval.as_secs_f64() * rate;
    let grid_frames = (column_frames * grid_width as f64).round() as usize;

    // (offset, buffer, frame count) for every voice that would sound
    let voices: Vec<_> = sequence
        .events()
        .iter()
        .filter(|e| e.start < grid_width)
        .filter_map(|e| {
            let buffer = bank.lookup(e.instrument.as_str(), e.note)?;
            let offset = (column_frames * e.start as f64).round() as usize;
            let frames = buffer.frames_for(interval * e.length());
            Some((offset, buffer, frames))
        })
        .collect();

    let total = voices
        .iter()
        .map(|(offset, _, frames)| offset + frames)
        .max()
        .unwrap_or(0)
        .max(grid_frames);

    let mut mix = vec![[0i32; 2]; total];
    for (offset, buffer, frames) in &voices {
        for (out, frame) in mix[*offset..].iter_mut().zip(&buffer.frames()[..*frames]) {
            out[0] += i32::from(frame[0]);
            out[1] += i32::from(frame[1]);
        }
    }

    mix.into_iter()
        .map(|[l, r]| [clamp_i16(l), clamp_i16(r)])
        .collect()
}

#[inline]
fn clamp_i16(sample: i32) -> i16 {
    sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Exports one grid cycle of a sequence to a WAV file.
///
/// # Arguments
///
/// * `sequence` - The sequence to export
/// * `bank` - Voice bank to take note buffers from
/// * `tempo` - Beats per minute
/// * `grid_width` - Columns in one cycle
/// * `output_path` - Path for the output WAV file
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Errors
///
/// Returns error if the output file cannot be created or written
pub fn export_to_wav<P, F>(
    sequence: &Sequence,
    bank: &VoiceBank,
    tempo: u32,
    grid_width: u32,
    output_path: P,
    mut progress_callback: Option<F>,
) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let frames = render_sequence(sequence, bank, tempo, grid_width);

    let spec = WavSpec {
        channels: 2,
        sample_rate: bank.settings().sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).with_context(|| {
        format!(
            "Failed to create output WAV file: {}",
            output_path.as_ref().display()
        )
    })?;

    let total = frames.len().max(1);
    for (i, chunk) in frames.chunks(PROGRESS_CHUNK).enumerate() {
        for [left, right] in chunk {
            writer.write_sample(*left)?;
            writer.write_sample(*right)?;
        }
        if let Some(ref mut callback) = progress_callback {
            let written = (i * PROGRESS_CHUNK + chunk.len()).min(total);
            callback(written as f32 / total as f32);
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    tracing::info!(
        frames = frames.len(),
        path = %output_path.as_ref().display(),
        "exported sequence"
    );

    Ok(())
}
