//! Score rendering: turns a whole score into one contiguous PCM buffer.

use std::collections::TryReserveError;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::dsp::oscillator;
use crate::score::Score;
use crate::SAMPLE_RATE;

/// Errors that can occur while rendering a score
#[derive(Debug, Error)]
pub enum RenderError {
    /// The output buffer could not be allocated
    #[error("failed to allocate a buffer of {samples} samples: {source}")]
    Allocation {
        samples: u64,
        #[source]
        source: TryReserveError,
    },
    /// The score is longer than this platform can address
    #[error("score needs {samples} samples, more than fit in memory")]
    TooLong { samples: u64 },
}

/// Mono 16-bit PCM at [`SAMPLE_RATE`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<i16> {
        self.samples
    }

    /// Playback length at the fixed sample rate
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(SAMPLE_RATE))
    }
}

impl From<Vec<i16>> for SampleBuffer {
    fn from(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}

impl AsRef<[i16]> for SampleBuffer {
    fn as_ref(&self) -> &[i16] {
        &self.samples
    }
}

/// Number of samples a note of `duration_ms` occupies.
///
/// Fractions of a sample are truncated per note, so a long run of very short
/// notes drifts slightly early.
pub const fn samples_for_duration(duration_ms: u32) -> u64 {
    duration_ms as u64 * SAMPLE_RATE as u64 / 1000
}

/// Total number of samples needed to render `score`.
pub fn total_samples(score: &Score) -> u64 {
    score
        .iter()
        .map(|note| samples_for_duration(note.duration_ms))
        .fold(0u64, u64::saturating_add)
}

/// Render every note of `score`, back to back, into a single buffer.
///
/// The buffer is allocated once at its final size before any sample is
/// written. Note `n` occupies exactly the samples between the end of note
/// `n - 1` and the start of note `n + 1`.
pub fn render(score: &Score) -> Result<SampleBuffer, RenderError> {
    let total = total_samples(score);
    let len = usize::try_from(total).map_err(|_| RenderError::TooLong { samples: total })?;

    let mut samples = Vec::new();
    samples
        .try_reserve_exact(len)
        .map_err(|source| RenderError::Allocation {
            samples: total,
            source,
        })?;
    samples.resize(len, 0);

    let mut rest = samples.as_mut_slice();
    for note in score {
        // Each note's count is bounded by `total`, which already fit in usize
        let count = samples_for_duration(note.duration_ms) as usize;
        let (range, tail) = rest.split_at_mut(count);
        oscillator::fill(note.waveform, note.frequency, range);
        rest = tail;
    }

    debug!(
        "rendered {} notes into {len} samples ({:.3}s)",
        score.len(),
        len as f64 / f64::from(SAMPLE_RATE)
    );
    Ok(SampleBuffer { samples })
}
