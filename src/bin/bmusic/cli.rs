use std::path::PathBuf;

use bmusic::{ConfigError, OutputTarget, PipelineConfig, WaveformKind};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Play a .bmusic note list, or render it to a WAV or MP3 file
#[derive(Debug, Parser)]
#[command(name = "bmusic")]
#[command(version)]
#[command(after_help = "Without --output the score is played on the default audio device.")]
pub struct Cli {
    /// Write to this file instead of playing
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output file format: 'wav' or 'mp3'
    #[arg(short, long, default_value = "wav")]
    pub format: String,

    /// MP3 quality, 0 (best) to 9 (fastest)
    #[arg(short = 'c', long, default_value_t = 5, allow_negative_numbers = true)]
    pub compression: i64,

    /// Waveform used for every note
    #[arg(short, long, value_enum, default_value_t = Wave::Sine)]
    pub wave: Wave,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Note list to read
    pub score: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Wave {
    #[value(alias = "0")]
    Square,
    #[value(alias = "1")]
    Sine,
}

impl From<Wave> for WaveformKind {
    fn from(wave: Wave) -> Self {
        match wave {
            Wave::Square => WaveformKind::Square,
            Wave::Sine => WaveformKind::Sine,
        }
    }
}

impl Cli {
    /// Validate the output options; nothing has been read yet when this fails.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let target = OutputTarget::from_options(self.output.clone(), &self.format, self.compression)?;
        Ok(PipelineConfig::new(self.wave.into(), target))
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmusic::Mp3Quality;
    use std::ffi::OsString;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bmusic").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_play_sine_live() {
        let cli = cli(&["song.bmusic"]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.waveform, WaveformKind::Sine);
        assert_eq!(config.target, OutputTarget::Device);
        assert_eq!(cli.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn mp3_output() {
        let config = cli(&["-o", "out.mp3", "-f", "mp3", "-c", "0", "-w", "0", "song.bmusic"])
            .pipeline_config()
            .unwrap();
        assert_eq!(config.waveform, WaveformKind::Square);
        assert_eq!(
            config.target,
            OutputTarget::Mp3 {
                path: "out.mp3".into(),
                quality: Mp3Quality::BEST,
            }
        );
    }

    #[test]
    fn quality_ten_is_rejected() {
        let result = cli(&["-o", "out.mp3", "-f", "mp3", "-c", "10", "song.bmusic"]).pipeline_config();
        assert_eq!(result, Err(ConfigError::QualityOutOfRange(10)));
    }

    #[test]
    fn quality_fails_without_touching_the_score() {
        let dir = tempfile::tempdir().unwrap();
        let score = dir.path().join("missing.bmusic");
        let output = dir.path().join("out.wav");
        let cli = Cli::try_parse_from([
            OsString::from("bmusic"),
            "-o".into(),
            output.clone().into_os_string(),
            "-c".into(),
            "-1".into(),
            score.into_os_string(),
        ])
        .unwrap();

        assert_eq!(cli.pipeline_config(), Err(ConfigError::QualityOutOfRange(-1)));
        assert!(!output.exists());
    }

    #[test]
    fn wave_names_and_numbers() {
        assert_eq!(cli(&["-w", "square", "s"]).wave, Wave::Square);
        assert_eq!(cli(&["-w", "1", "s"]).wave, Wave::Sine);
    }

    #[test]
    fn score_is_required() {
        assert!(Cli::try_parse_from(["bmusic"]).is_err());
    }

    #[test]
    fn verbosity() {
        assert_eq!(cli(&["-vv", "s"]).log_level(), LevelFilter::Debug);
    }
}
