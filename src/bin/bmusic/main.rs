//! bmusic - play or render plain-text note lists
//!
//! Run with: cargo run -- [-o FILE] [-f wav|mp3] [-c 0-9] [-w square|sine] SCORE

mod cli;

use bmusic::pipeline;
use clap::Parser;
use cli::Cli;
use color_eyre::eyre::{Result as EyreResult, WrapErr};

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    // Reject bad output options before the score is touched
    let config = cli.pipeline_config()?;

    let summary = pipeline::run_file(&cli.score, &config)
        .wrap_err_with(|| format!("failed to render {}", cli.score.display()))?;

    if cli.output.is_some() {
        println!(
            "{} notes, {:.2}s -> {}",
            summary.notes,
            summary.duration.as_secs_f64(),
            config.target
        );
    }
    Ok(())
}
