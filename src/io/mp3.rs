//! MP3 file output.
//!
//! The encoder is fed fixed-size chunks and its output is written to the file
//! as soon as each chunk is encoded. After the last chunk the encoder is
//! flushed and whatever it was still holding is appended.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use super::{Sink, SinkError};
use crate::config::Mp3Quality;
use crate::render::SampleBuffer;

/// Largest number of samples handed to the encoder at once (one MPEG-1
/// Layer III frame).
pub const CHUNK_FRAMES: usize = 1152;

/// A streaming PCM to compressed-audio encoder.
pub trait FrameEncoder {
    /// Encode one chunk of mono samples, appending any output to `out`.
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), SinkError>;

    /// Emit whatever the encoder is still buffering.
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), SinkError>;
}

/// Encode `samples` in chunks of at most [`CHUNK_FRAMES`] and write the
/// result to `writer`. Returns the number of bytes written.
pub fn encode_chunks<E, W>(encoder: &mut E, samples: &[i16], writer: &mut W) -> Result<usize, EncodeIoError>
where
    E: FrameEncoder + ?Sized,
    W: Write + ?Sized,
{
    let mut encoded = Vec::new();
    let mut total = 0;

    for chunk in samples.chunks(CHUNK_FRAMES) {
        encoded.clear();
        encoder.encode(chunk, &mut encoded)?;
        writer.write_all(&encoded)?;
        total += encoded.len();
    }

    encoded.clear();
    encoder.flush(&mut encoded)?;
    writer.write_all(&encoded)?;
    total += encoded.len();

    writer.flush()?;
    Ok(total)
}

/// Failure inside [`encode_chunks`]: either the codec or the destination.
#[derive(Debug, Error)]
pub enum EncodeIoError {
    #[error(transparent)]
    Encoder(#[from] SinkError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Writes the buffer as a mono MP3 file.
pub struct Mp3Sink<F> {
    path: PathBuf,
    quality: Mp3Quality,
    make_encoder: F,
}

impl<F, E> Mp3Sink<F>
where
    F: FnMut(u32, Mp3Quality) -> Result<E, SinkError>,
    E: FrameEncoder,
{
    /// Encode with encoders built by `make_encoder(sample_rate, quality)`.
    pub fn with_encoder(path: impl Into<PathBuf>, quality: Mp3Quality, make_encoder: F) -> Self {
        Self {
            path: path.into(),
            quality,
            make_encoder,
        }
    }
}

#[cfg(feature = "mp3")]
impl Mp3Sink<fn(u32, Mp3Quality) -> Result<lame::LameEncoder, SinkError>> {
    /// Encode with LAME.
    pub fn new(path: impl Into<PathBuf>, quality: Mp3Quality) -> Self {
        Self::with_encoder(path, quality, lame::LameEncoder::new)
    }
}

impl<F, E> Sink for Mp3Sink<F>
where
    F: FnMut(u32, Mp3Quality) -> Result<E, SinkError>,
    E: FrameEncoder,
{
    fn consume(&mut self, buffer: SampleBuffer, sample_rate: u32) -> Result<(), SinkError> {
        // Encoder first, so a codec failure leaves no empty file behind
        let mut encoder = (self.make_encoder)(sample_rate, self.quality)?;

        let file = File::create(&self.path).map_err(|source| SinkError::FileOpen {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let bytes = encode_chunks(&mut encoder, buffer.as_slice(), &mut writer).map_err(|err| match err {
            EncodeIoError::Encoder(err) => err,
            EncodeIoError::Io(source) => SinkError::FileWrite {
                path: self.path.clone(),
                source,
            },
        })?;

        debug!(
            "encoded {} frames into {bytes} bytes at quality {} ({})",
            buffer.len(),
            self.quality.level(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(feature = "mp3")]
pub use lame::LameEncoder;

#[cfg(feature = "mp3")]
mod lame {
    use mp3lame_encoder::{max_required_buffer_size, Builder, Encoder, FlushNoGap, MonoPcm, Quality};

    use super::FrameEncoder;
    use crate::config::Mp3Quality;
    use crate::io::SinkError;

    /// Worst-case size of the data LAME returns from a flush.
    const FLUSH_BYTES: usize = 7200;

    /// LAME configured for mono input.
    pub struct LameEncoder {
        inner: Encoder,
    }

    impl LameEncoder {
        pub fn new(sample_rate: u32, quality: Mp3Quality) -> Result<Self, SinkError> {
            let mut builder = Builder::new()
                .ok_or_else(|| SinkError::Encoder("failed to allocate LAME context".to_string()))?;
            builder.set_num_channels(1).map_err(encoder_error)?;
            builder.set_sample_rate(sample_rate).map_err(encoder_error)?;
            builder.set_quality(lame_quality(quality)).map_err(encoder_error)?;
            let inner = builder.build().map_err(encoder_error)?;
            Ok(Self { inner })
        }
    }

    impl FrameEncoder for LameEncoder {
        fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), SinkError> {
            out.reserve(max_required_buffer_size(pcm.len()));
            self.inner
                .encode_to_vec(MonoPcm(pcm), out)
                .map_err(encoder_error)?;
            Ok(())
        }

        fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), SinkError> {
            out.reserve(FLUSH_BYTES);
            self.inner
                .flush_to_vec::<FlushNoGap>(out)
                .map_err(encoder_error)?;
            Ok(())
        }
    }

    /// LAME's quality scale has the same direction: 0 best, 9 worst.
    fn lame_quality(quality: Mp3Quality) -> Quality {
        match quality.level() {
            0 => Quality::Best,
            1 => Quality::SecondBest,
            2 => Quality::NearBest,
            3 => Quality::VeryNice,
            4 => Quality::Nice,
            5 => Quality::Good,
            6 => Quality::Decent,
            7 => Quality::Ok,
            8 => Quality::SecondWorst,
            _ => Quality::Worst,
        }
    }

    fn encoder_error(err: impl std::fmt::Display) -> SinkError {
        SinkError::Encoder(err.to_string())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn quality_levels_pass_through_unchanged() {
            for level in 0..=9 {
                let quality = Mp3Quality::new(level).unwrap();
                assert_eq!(lame_quality(quality) as i64, level);
            }
        }

        #[test]
        fn quality_ends_are_not_swapped() {
            assert!(matches!(lame_quality(Mp3Quality::BEST), Quality::Best));
            assert!(matches!(lame_quality(Mp3Quality::WORST), Quality::Worst));
        }

        #[test]
        fn encoder_builds_for_every_level() {
            for level in 0..=9 {
                LameEncoder::new(44100, Mp3Quality::new(level).unwrap()).unwrap();
            }
        }
    }
}
