//! Caller-facing configuration: which waveform to use and where the audio goes.
//!
//! Everything here is validated when it is constructed, so a bad quality
//! level or format is rejected before a score is even opened.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::score::WaveformKind;

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown output format '{0}' (expected 'wav' or 'mp3')")]
    UnknownFormat(String),
    #[error("MP3 quality must be between 0 and 9, got {0}")]
    QualityOutOfRange(i64),
}

/// File container written when a destination path is given
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wav" => Ok(OutputFormat::Wav),
            "mp3" => Ok(OutputFormat::Mp3),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
        })
    }
}

/// MP3 encoder quality level, 0 through 9.
///
/// Lower is better: 0 is the highest quality (and slowest encode), 9 the
/// lowest. The value is handed to the encoder unchanged.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "u8"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mp3Quality(u8);

impl Mp3Quality {
    pub const BEST: Mp3Quality = Mp3Quality(0);
    pub const WORST: Mp3Quality = Mp3Quality(9);

    pub fn new(level: i64) -> Result<Self, ConfigError> {
        match u8::try_from(level) {
            Ok(level @ 0..=9) => Ok(Mp3Quality(level)),
            _ => Err(ConfigError::QualityOutOfRange(level)),
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Mp3Quality {
    fn default() -> Self {
        Mp3Quality(5)
    }
}

impl TryFrom<i64> for Mp3Quality {
    type Error = ConfigError;

    fn try_from(level: i64) -> Result<Self, Self::Error> {
        Mp3Quality::new(level)
    }
}

impl From<Mp3Quality> for u8 {
    fn from(quality: Mp3Quality) -> Self {
        quality.0
    }
}

/// Where the rendered audio goes
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Play on the default output device
    #[default]
    Device,
    Wav { path: PathBuf },
    Mp3 { path: PathBuf, quality: Mp3Quality },
}

impl OutputTarget {
    /// Build a target from loose options: no path means live playback,
    /// otherwise `format` picks the container.
    ///
    /// The quality is checked even when it will not be used, so a bad value
    /// is always reported.
    pub fn from_options(
        destination: Option<PathBuf>,
        format: &str,
        quality: i64,
    ) -> Result<Self, ConfigError> {
        let quality = Mp3Quality::new(quality)?;
        let format: OutputFormat = format.parse()?;

        Ok(match destination {
            None => OutputTarget::Device,
            Some(path) => match format {
                OutputFormat::Wav => OutputTarget::Wav { path },
                OutputFormat::Mp3 => OutputTarget::Mp3 { path, quality },
            },
        })
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Device => f.write_str("default audio device"),
            OutputTarget::Wav { path } => write!(f, "WAV file {}", path.display()),
            OutputTarget::Mp3 { path, quality } => {
                write!(f, "MP3 file {} (quality {})", path.display(), quality.level())
            }
        }
    }
}

/// Everything the pipeline needs besides the score itself
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    /// Waveform given to every parsed note
    pub waveform: WaveformKind,
    pub target: OutputTarget,
}

impl PipelineConfig {
    pub fn new(waveform: WaveformKind, target: OutputTarget) -> Self {
        Self { waveform, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_range() {
        for level in 0..=9 {
            assert_eq!(Mp3Quality::new(level).unwrap().level(), level as u8);
        }
        assert_eq!(Mp3Quality::new(10), Err(ConfigError::QualityOutOfRange(10)));
        assert_eq!(Mp3Quality::new(-1), Err(ConfigError::QualityOutOfRange(-1)));
        assert_eq!(Mp3Quality::new(256), Err(ConfigError::QualityOutOfRange(256)));
    }

    #[test]
    fn quality_is_not_inverted() {
        assert!(Mp3Quality::BEST < Mp3Quality::WORST);
        assert_eq!(Mp3Quality::BEST.level(), 0);
        assert_eq!(Mp3Quality::default().level(), 5);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("wav".parse::<OutputFormat>(), Ok(OutputFormat::Wav));
        assert_eq!("mp3".parse::<OutputFormat>(), Ok(OutputFormat::Mp3));
        assert_eq!(
            "ogg".parse::<OutputFormat>(),
            Err(ConfigError::UnknownFormat("ogg".into()))
        );
    }

    #[test]
    fn target_selection() {
        assert_eq!(
            OutputTarget::from_options(None, "mp3", 5),
            Ok(OutputTarget::Device)
        );
        assert_eq!(
            OutputTarget::from_options(Some("a.wav".into()), "wav", 5),
            Ok(OutputTarget::Wav {
                path: "a.wav".into()
            })
        );
        assert_eq!(
            OutputTarget::from_options(Some("a.mp3".into()), "mp3", 2),
            Ok(OutputTarget::Mp3 {
                path: "a.mp3".into(),
                quality: Mp3Quality::new(2).unwrap(),
            })
        );
    }

    #[test]
    fn target_rejects_bad_options() {
        assert_eq!(
            OutputTarget::from_options(Some("a.mp3".into()), "mp3", 10),
            Err(ConfigError::QualityOutOfRange(10))
        );
        assert!(matches!(
            OutputTarget::from_options(Some("a.flac".into()), "flac", 5),
            Err(ConfigError::UnknownFormat(_))
        ));
    }
}
