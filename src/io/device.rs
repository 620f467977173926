//! Live playback on the default output device.
//!
//! The playback policy (write everything, wait for the device to drain,
//! recover at most once along the way) lives in [`play_all`] and only talks
//! to a [`PcmDevice`]. The cpal-backed device is compiled in with the
//! `playback` feature.

use log::{debug, warn};
use thiserror::Error;

use super::{Sink, SinkError};
use crate::render::SampleBuffer;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Period size requested from the device, in frames.
pub const PERIOD_TARGET_FRAMES: u32 = 1024;

/// The device could not be opened or configured
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no default audio output device available")]
    NoDevice,
    #[error("cannot open audio device: {0}")]
    Open(#[source] BoxError),
    #[error("cannot set hardware parameters: {0}")]
    Configure(#[source] BoxError),
}

/// Writing to an open device failed
#[derive(Debug, Error)]
pub enum DeviceWriteError {
    /// The device reported an error while accepting or playing frames
    #[error("write to audio device failed: {0}")]
    Write(#[source] BoxError),
    #[error("audio device did not recover: {0}")]
    Recover(#[source] BoxError),
    /// Queued frames stopped being played
    #[error("waiting for playback to finish failed: {0}")]
    Drain(#[source] BoxError),
}

impl DeviceWriteError {
    /// Whether a recovery pass may get the device going again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

/// Parameters a device is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    /// Preferred period size; the device picks the nearest size it supports
    pub period_frames: u32,
    /// Number of frames that will be written in total
    pub capacity_frames: usize,
}

/// An open mono, 16-bit playback device.
///
/// Closing happens on drop.
pub trait PcmDevice {
    /// Queue `frames` for playback, blocking until they are accepted.
    ///
    /// Returns the number of frames queued. On error nothing from this call
    /// has been queued.
    fn write(&mut self, frames: &[i16]) -> Result<usize, DeviceWriteError>;

    /// Bring the device back into a playing state after `error`.
    ///
    /// Frames already queued stay queued.
    fn recover(&mut self, error: &DeviceWriteError) -> Result<(), DeviceWriteError>;

    /// Block until every queued frame has been played.
    ///
    /// A device error while playing is [`DeviceWriteError::Write`]; calling
    /// `drain` again after [`recover`](Self::recover) resumes the wait.
    /// [`DeviceWriteError::Drain`] means playback stalled.
    fn drain(&mut self) -> Result<(), DeviceWriteError>;
}

impl<D: PcmDevice + ?Sized> PcmDevice for Box<D> {
    fn write(&mut self, frames: &[i16]) -> Result<usize, DeviceWriteError> {
        (**self).write(frames)
    }

    fn recover(&mut self, error: &DeviceWriteError) -> Result<(), DeviceWriteError> {
        (**self).recover(error)
    }

    fn drain(&mut self) -> Result<(), DeviceWriteError> {
        (**self).drain()
    }
}

/// Write `frames` in one call and wait for them to play, recovering at
/// most once.
///
/// A first device error, whether it shows up while queueing or while the
/// queue plays out, triggers [`PcmDevice::recover`]. A failed write is then
/// retried; an interrupted drain resumes. A failed recovery or a second
/// error is returned as-is.
pub fn play_all<D: PcmDevice + ?Sized>(device: &mut D, frames: &[i16]) -> Result<usize, DeviceWriteError> {
    let mut recovered = false;

    let written = match device.write(frames) {
        Ok(written) => written,
        Err(err) => {
            warn!("{err}; attempting recovery");
            device.recover(&err)?;
            recovered = true;
            device.write(frames)?
        }
    };

    if written != frames.len() {
        warn!("short write ({written} / {} frames)", frames.len());
    }

    loop {
        match device.drain() {
            Ok(()) => return Ok(written),
            Err(err) if err.is_recoverable() && !recovered => {
                warn!("{err} during playback; attempting recovery");
                device.recover(&err)?;
                recovered = true;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Plays the buffer on an audio device, returning once it has been heard.
pub struct LiveSink<F> {
    open: F,
    period_frames: u32,
}

impl<F, D> LiveSink<F>
where
    F: FnMut(&DeviceConfig) -> Result<D, DeviceError>,
    D: PcmDevice,
{
    /// Play through devices produced by `open`.
    pub fn with_opener(open: F) -> Self {
        Self {
            open,
            period_frames: PERIOD_TARGET_FRAMES,
        }
    }

    pub fn period_frames(mut self, frames: u32) -> Self {
        self.period_frames = frames;
        self
    }
}

#[cfg(feature = "playback")]
impl LiveSink<fn(&DeviceConfig) -> Result<cpal_device::CpalDevice, DeviceError>> {
    /// Play through the system's default output device.
    pub fn default_device() -> Self {
        Self::with_opener(cpal_device::CpalDevice::open)
    }
}

impl<F, D> Sink for LiveSink<F>
where
    F: FnMut(&DeviceConfig) -> Result<D, DeviceError>,
    D: PcmDevice,
{
    fn consume(&mut self, buffer: SampleBuffer, sample_rate: u32) -> Result<(), SinkError> {
        let config = DeviceConfig {
            sample_rate,
            period_frames: self.period_frames,
            capacity_frames: buffer.len(),
        };
        let mut device = (self.open)(&config)?;

        debug!("playing {} frames", buffer.len());
        play_all(&mut device, buffer.as_slice())?;
        debug!("playback finished");
        Ok(())
    }
}

#[cfg(feature = "playback")]
pub use cpal_device::CpalDevice;

#[cfg(feature = "playback")]
mod cpal_device {
    use std::thread;
    use std::time::{Duration, Instant};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{
        BufferSize, FromSample, Sample, SampleFormat, SizedSample, SupportedBufferSize,
        SupportedStreamConfig, SupportedStreamConfigRange,
    };
    use crossbeam_channel::{Receiver, Sender};
    use log::{debug, info};
    use rtrb::{Consumer, Producer, RingBuffer};

    use super::{DeviceConfig, DeviceError, DeviceWriteError, PcmDevice};

    const POLL_INTERVAL: Duration = Duration::from_millis(10);
    /// Extra time allowed for the device to catch up before giving up on a drain
    const DRAIN_GRACE: Duration = Duration::from_secs(2);

    /// Default output device driven by a cpal stream.
    ///
    /// The data callback pulls from a ring buffer sized to hold the whole
    /// piece, so a single write never has to wait for space. Playback errors
    /// surface while draining.
    pub struct CpalDevice {
        stream: cpal::Stream,
        producer: Producer<i16>,
        capacity: usize,
        errors: Receiver<cpal::StreamError>,
        sample_rate: u32,
        period: Duration,
        playing: bool,
    }

    /// Channel layout and sample format the stream is opened with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct OutputLayout {
        pub channels: u16,
        pub sample_format: SampleFormat,
        pub buffer_size: SupportedBufferSize,
    }

    impl CpalDevice {
        pub fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(DeviceError::NoDevice)?;
            let name = device.name().unwrap_or_else(|_| "default".to_string());
            let rate = config.sample_rate;

            let ranges: Vec<_> = device
                .supported_output_configs()
                .map_err(|e| DeviceError::Open(Box::new(e)))?
                .collect();
            let default = device.default_output_config().ok();

            let layout = choose_layout(&ranges, default.as_ref(), rate).ok_or_else(|| {
                DeviceError::Configure(format!("{name} has no usable output format at {rate} Hz").into())
            })?;

            let period_frames = negotiate_period(config.period_frames, &layout.buffer_size);
            let stream_config = cpal::StreamConfig {
                channels: layout.channels,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: period_frames.map_or(BufferSize::Default, BufferSize::Fixed),
            };

            let capacity = config.capacity_frames.max(1);
            let (producer, consumer) = RingBuffer::<i16>::new(capacity);
            let (error_tx, errors) = crossbeam_channel::unbounded();

            let stream = match layout.sample_format {
                SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, consumer, error_tx),
                SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, consumer, error_tx),
                SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, consumer, error_tx),
                other => {
                    return Err(DeviceError::Configure(
                        format!("unsupported sample format {other:?}").into(),
                    ))
                }
            }
            .map_err(|e| DeviceError::Configure(Box::new(e)))?;

            let period_frames = period_frames.unwrap_or(config.period_frames);
            info!(
                "opened {name}: {rate} Hz, {} ch {:?}, period {period_frames} frames",
                layout.channels, layout.sample_format
            );

            Ok(Self {
                stream,
                producer,
                capacity,
                errors,
                sample_rate: rate,
                period: frames_to_duration(period_frames as usize, rate),
                playing: false,
            })
        }

        fn pending_error(&self) -> Option<cpal::StreamError> {
            self.errors.try_recv().ok()
        }

        fn queued(&self) -> usize {
            self.capacity - self.producer.slots()
        }
    }

    /// Output stream fed from `consumer`, one mono frame per device frame.
    ///
    /// Each sample is converted to `T` and copied to every channel. Frames
    /// missing from the ring play as silence.
    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: Consumer<i16>,
        errors: Sender<cpal::StreamError>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample + FromSample<i16>,
    {
        let channels = usize::from(config.channels.max(1));
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = <T as Sample>::from_sample(consumer.pop().unwrap_or(0));
                    frame.fill(value);
                }
            },
            move |err| {
                // The receiver is gone once the device is dropped
                let _ = errors.send(err);
            },
            None,
        )
    }

    impl PcmDevice for CpalDevice {
        fn write(&mut self, frames: &[i16]) -> Result<usize, DeviceWriteError> {
            if let Some(err) = self.pending_error() {
                return Err(DeviceWriteError::Write(Box::new(err)));
            }

            let mut written = 0;
            for &frame in frames {
                if self.producer.push(frame).is_err() {
                    break;
                }
                written += 1;
            }

            if !self.playing {
                self.stream
                    .play()
                    .map_err(|e| DeviceWriteError::Write(Box::new(e)))?;
                self.playing = true;
            }
            Ok(written)
        }

        fn recover(&mut self, error: &DeviceWriteError) -> Result<(), DeviceWriteError> {
            debug!("restarting stream after: {error}");
            while self.errors.try_recv().is_ok() {}

            if let Err(err) = self.stream.pause() {
                debug!("pause before restart failed: {err}");
            }
            self.stream
                .play()
                .map_err(|e| DeviceWriteError::Recover(Box::new(e)))?;
            self.playing = true;
            Ok(())
        }

        fn drain(&mut self) -> Result<(), DeviceWriteError> {
            let deadline =
                Instant::now() + frames_to_duration(self.queued(), self.sample_rate) + DRAIN_GRACE;

            while self.queued() > 0 {
                if let Some(err) = self.pending_error() {
                    return Err(DeviceWriteError::Write(Box::new(err)));
                }
                if Instant::now() > deadline {
                    return Err(DeviceWriteError::Drain(
                        format!("{} frames still queued after timeout", self.queued()).into(),
                    ));
                }
                thread::sleep(POLL_INTERVAL);
            }

            // The last period has left the ring but may still be in the device
            thread::sleep(self.period);
            if let Some(err) = self.pending_error() {
                return Err(DeviceWriteError::Write(Box::new(err)));
            }
            Ok(())
        }
    }

    /// Pick how to open the stream at `rate`.
    ///
    /// Mono 16-bit is used when the device offers it. Otherwise the device's
    /// default layout, if it runs at `rate`, and then any layout that covers
    /// `rate` in a sample format the callback can convert to.
    pub(super) fn choose_layout(
        ranges: &[SupportedStreamConfigRange],
        default: Option<&SupportedStreamConfig>,
        rate: u32,
    ) -> Option<OutputLayout> {
        let covers = |range: &&SupportedStreamConfigRange| {
            range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0
        };

        let from_range = |range: &SupportedStreamConfigRange| OutputLayout {
            channels: range.channels(),
            sample_format: range.sample_format(),
            buffer_size: *range.buffer_size(),
        };

        if let Some(range) = ranges
            .iter()
            .filter(covers)
            .find(|r| r.channels() == 1 && r.sample_format() == SampleFormat::I16)
        {
            return Some(from_range(range));
        }

        if let Some(default) = default.filter(|d| {
            d.sample_rate().0 == rate && d.channels() > 0 && convertible(d.sample_format())
        }) {
            return Some(OutputLayout {
                channels: default.channels(),
                sample_format: default.sample_format(),
                buffer_size: *default.buffer_size(),
            });
        }

        ranges
            .iter()
            .filter(covers)
            .find(|r| r.channels() > 0 && convertible(r.sample_format()))
            .map(from_range)
    }

    fn convertible(format: SampleFormat) -> bool {
        matches!(format, SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32)
    }

    /// Pick the supported period size closest to `target`.
    ///
    /// `None` means the device does not report a range and chooses itself.
    pub(super) fn negotiate_period(target: u32, supported: &SupportedBufferSize) -> Option<u32> {
        match supported {
            SupportedBufferSize::Range { min, max } => Some(target.clamp(*min, (*max).max(*min))),
            SupportedBufferSize::Unknown => None,
        }
    }

    fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use cpal::SampleRate;

        const ANY_PERIOD: SupportedBufferSize = SupportedBufferSize::Range { min: 64, max: 4096 };

        fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
            SupportedStreamConfigRange::new(channels, SampleRate(min), SampleRate(max), ANY_PERIOD, format)
        }

        fn default_config(channels: u16, rate: u32, format: SampleFormat) -> SupportedStreamConfig {
            SupportedStreamConfig::new(channels, SampleRate(rate), SupportedBufferSize::Unknown, format)
        }

        #[test]
        fn period_is_clamped_to_supported_range() {
            let range = SupportedBufferSize::Range { min: 64, max: 512 };
            assert_eq!(negotiate_period(1024, &range), Some(512));
            assert_eq!(negotiate_period(16, &range), Some(64));
            assert_eq!(negotiate_period(256, &range), Some(256));
        }

        #[test]
        fn unknown_range_lets_device_choose() {
            assert_eq!(negotiate_period(1024, &SupportedBufferSize::Unknown), None);
        }

        #[test]
        fn frame_durations() {
            assert_eq!(frames_to_duration(44100, 44100), Duration::from_secs(1));
            assert_eq!(frames_to_duration(0, 44100), Duration::ZERO);
        }

        #[test]
        fn mono_i16_is_preferred() {
            let ranges = [
                range(2, 8000, 96000, SampleFormat::F32),
                range(1, 8000, 96000, SampleFormat::I16),
            ];
            let default = default_config(2, 44100, SampleFormat::F32);

            let layout = choose_layout(&ranges, Some(&default), 44100).unwrap();
            assert_eq!(layout.channels, 1);
            assert_eq!(layout.sample_format, SampleFormat::I16);
            assert_eq!(layout.buffer_size, ANY_PERIOD);
        }

        #[test]
        fn stereo_float_device_uses_default_layout() {
            // Typical CoreAudio / WASAPI shared mode
            let ranges = [range(2, 44100, 48000, SampleFormat::F32)];
            let default = default_config(2, 44100, SampleFormat::F32);

            let layout = choose_layout(&ranges, Some(&default), 44100).unwrap();
            assert_eq!(layout.channels, 2);
            assert_eq!(layout.sample_format, SampleFormat::F32);
            assert_eq!(layout.buffer_size, SupportedBufferSize::Unknown);
        }

        #[test]
        fn default_at_another_rate_falls_back_to_a_covering_range() {
            let ranges = [
                range(2, 48000, 48000, SampleFormat::F32),
                range(2, 44100, 44100, SampleFormat::I16),
            ];
            let default = default_config(2, 48000, SampleFormat::F32);

            let layout = choose_layout(&ranges, Some(&default), 44100).unwrap();
            assert_eq!(layout.channels, 2);
            assert_eq!(layout.sample_format, SampleFormat::I16);
        }

        #[test]
        fn no_usable_layout() {
            let ranges = [
                range(2, 48000, 96000, SampleFormat::F32),
                range(1, 8000, 96000, SampleFormat::F64),
            ];
            let default = default_config(1, 44100, SampleFormat::F64);
            assert_eq!(choose_layout(&ranges, Some(&default), 44100), None);
            assert_eq!(choose_layout(&[], None, 44100), None);
        }
    }
}
