//! The end-to-end path from a score file to an output destination.
//!
//! ```ignore
//! use bmusic::{pipeline, OutputTarget, PipelineConfig, WaveformKind};
//!
//! let config = PipelineConfig::new(
//!     WaveformKind::Sine,
//!     OutputTarget::Wav { path: "song.wav".into() },
//! );
//! let summary = pipeline::run_file("song.bmusic", &config)?;
//! println!("{} notes, {:?}", summary.notes, summary.duration);
//! ```

use std::path::Path;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::io::{self, Sink, SinkError};
use crate::render::{self, RenderError};
use crate::score::{self, ParseError, Score};
use crate::SAMPLE_RATE;

/// Any failure between reading the score and delivering the audio
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The score parsed but contained no notes
    #[error("no notes found in the score")]
    EmptyScore,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// What was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub notes: usize,
    pub samples: usize,
    pub duration: Duration,
}

/// Parse the score at `path` and deliver it to the configured target.
pub fn run_file(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<Summary, PipelineError> {
    let score = score::parse_file(path, config.waveform)?;
    let mut sink = io::open_sink(&config.target)?;
    info!("output: {}", config.target);
    play(&score, &mut sink)
}

/// Render `score` and hand the result to `sink`.
///
/// An empty score is rejected before anything is allocated or opened.
pub fn play<S: Sink + ?Sized>(score: &Score, sink: &mut S) -> Result<Summary, PipelineError> {
    if score.is_empty() {
        return Err(PipelineError::EmptyScore);
    }

    let buffer = render::render(score)?;
    let summary = Summary {
        notes: score.len(),
        samples: buffer.len(),
        duration: buffer.duration(),
    };

    sink.consume(buffer, SAMPLE_RATE)?;
    info!(
        "delivered {} notes, {} samples ({:.2}s)",
        summary.notes,
        summary.samples,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}
