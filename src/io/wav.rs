//! WAV file output.

use std::io;
use std::path::PathBuf;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;

use super::{Sink, SinkError};
use crate::render::SampleBuffer;

/// Writes the buffer as a mono 16-bit PCM WAV file.
#[derive(Debug, Clone)]
pub struct WavSink {
    path: PathBuf,
}

impl WavSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_error(&self, err: hound::Error) -> SinkError {
        SinkError::FileWrite {
            path: self.path.clone(),
            source: into_io(err),
        }
    }
}

/// WAV header for mono 16-bit PCM at `sample_rate`
pub fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

impl Sink for WavSink {
    fn consume(&mut self, buffer: SampleBuffer, sample_rate: u32) -> Result<(), SinkError> {
        let mut writer =
            WavWriter::create(&self.path, wav_spec(sample_rate)).map_err(|err| SinkError::FileOpen {
                path: self.path.clone(),
                source: into_io(err),
            })?;

        let frames = u32::try_from(buffer.len()).map_err(|_| {
            self.write_error(hound::Error::TooWide)
        })?;

        // One block holding every frame; the header is sized from it on finalize
        let mut block = writer.get_i16_writer(frames);
        for &sample in buffer.as_slice() {
            block.write_sample(sample);
        }
        block.flush().map_err(|err| self.write_error(err))?;
        writer.finalize().map_err(|err| self.write_error(err))?;

        debug!("wrote {frames} frames to {}", self.path.display());
        Ok(())
    }
}

fn into_io(err: hound::Error) -> io::Error {
    match err {
        hound::Error::IoError(err) => err,
        other => io::Error::other(other),
    }
}
