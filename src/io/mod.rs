// Purpose - output destinations for rendered audio

pub mod device;
pub mod mp3;
pub mod wav;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::OutputTarget;
use crate::render::SampleBuffer;

pub use device::{DeviceError, DeviceWriteError, LiveSink, PcmDevice};
pub use mp3::{FrameEncoder, Mp3Sink};
pub use wav::WavSink;

/// Errors raised while delivering a buffer to its destination
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    DeviceWrite(#[from] DeviceWriteError),
    #[error("failed to open {} for writing: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("MP3 encoder error: {0}")]
    Encoder(String),
    /// The backend for this destination was compiled out
    #[error("{0} output is not available in this build")]
    Unavailable(&'static str),
}

/// A destination that takes ownership of a rendered buffer and plays or
/// stores it.
///
/// Callers never hand over an empty buffer.
pub trait Sink {
    fn consume(&mut self, buffer: SampleBuffer, sample_rate: u32) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn consume(&mut self, buffer: SampleBuffer, sample_rate: u32) -> Result<(), SinkError> {
        (**self).consume(buffer, sample_rate)
    }
}

/// Build the sink for `target`.
///
/// Nothing is opened here; devices and files are acquired inside
/// [`Sink::consume`] and released before it returns.
pub fn open_sink(target: &OutputTarget) -> Result<Box<dyn Sink>, SinkError> {
    match target {
        OutputTarget::Device => device_sink(),
        OutputTarget::Wav { path } => Ok(Box::new(WavSink::new(path))),
        OutputTarget::Mp3 { path, quality } => mp3_sink(path, *quality),
    }
}

#[cfg(feature = "playback")]
fn device_sink() -> Result<Box<dyn Sink>, SinkError> {
    Ok(Box::new(LiveSink::default_device()))
}

#[cfg(not(feature = "playback"))]
fn device_sink() -> Result<Box<dyn Sink>, SinkError> {
    Err(SinkError::Unavailable("live playback"))
}

#[cfg(feature = "mp3")]
fn mp3_sink(path: &std::path::Path, quality: crate::config::Mp3Quality) -> Result<Box<dyn Sink>, SinkError> {
    Ok(Box::new(Mp3Sink::new(path, quality)))
}

#[cfg(not(feature = "mp3"))]
fn mp3_sink(_path: &std::path::Path, _quality: crate::config::Mp3Quality) -> Result<Box<dyn Sink>, SinkError> {
    Err(SinkError::Unavailable("MP3"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_target_builds_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.wav");
        let target = OutputTarget::Wav { path: path.clone() };

        assert!(open_sink(&target).is_ok());
        assert!(!path.exists());
    }

    #[test]
    fn boxed_sink_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxed.wav");
        let mut sink = open_sink(&OutputTarget::Wav { path: path.clone() }).unwrap();

        sink.consume(SampleBuffer::from(vec![1, 2, 3]), crate::SAMPLE_RATE)
            .unwrap();
        assert!(path.exists());
    }
}
