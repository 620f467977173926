pub mod config;
pub mod dsp; // Tone generation
pub mod io; // Output sinks: device, WAV, MP3
pub mod pipeline;
pub mod render;
pub mod score; // Note lists and the .bmusic parser

pub use config::{ConfigError, Mp3Quality, OutputFormat, OutputTarget, PipelineConfig};
pub use pipeline::{PipelineError, Summary};
pub use render::{render, SampleBuffer};
pub use score::{Note, Score, WaveformKind};

/// Sample rate of every buffer, file and device stream, in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
