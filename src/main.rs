mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cli::Cli;
use mixsense::analysis::engine::{self, AnalysisConfig};
use mixsense::analysis::report;
use mixsense::audio::buffer::AudioBuffer;
use mixsense::audio::decode;
use mixsense::config::{self, Config};
use mixsense::host::file::FileProject;
use mixsense::pipeline::command::RequestContext;
use mixsense::pipeline::scheduler::{BounceMode, BounceTarget, ConfinedExecutor};
use mixsense::pipeline::state::SharedState;
use mixsense::remote::OpenAiClient;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect mixsense.toml /
    // global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("mixsense.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("mixsense").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("mixsense").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut config = Config::default();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // Merge: config values apply only when CLI is at its default
    if cli.window_size == 4096 {
        cli.window_size = config.analysis.window_size;
    }
    if cli.max_seconds == 30.0 {
        cli.max_seconds = config.analysis.max_seconds;
    }
    if cli.model == "gpt-4.1" {
        cli.model = config.remote.model.clone();
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("mixsense - offline mix analysis");
    log::info!("Input: {}", input.display());

    let buffer = decode::decode_file(input)?;

    let analysis_config = AnalysisConfig {
        window_size: cli.window_size,
        max_seconds: cli.max_seconds,
        fresh_decode: config.analysis.fresh_decode,
        ..AnalysisConfig::default()
    };

    match cli.ask.clone() {
        Some(query) => run_coach(&cli, &config, analysis_config, input, buffer, query),
        None => print_report(&cli, analysis_config, buffer),
    }
}

/// Analyze directly and print the report JSON.
fn print_report(cli: &Cli, config: AnalysisConfig, mut buffer: AudioBuffer) -> Result<()> {
    // Apply the same length cap the acquisition path enforces.
    let max_frames = (config.max_seconds * buffer.sample_rate as f32) as usize;
    let max_samples = max_frames * buffer.channels as usize;
    if buffer.samples.len() > max_samples {
        buffer.samples.truncate(max_samples);
    }

    log::info!("Analyzing {:.1}s of audio...", buffer.duration_secs());
    let result = engine::analyze(&buffer, &config);
    if !result.success {
        anyhow::bail!("Analysis failed: {}", result.error);
    }

    let json = if cli.compact {
        report::render(&result)?
    } else {
        report::render_pretty(&result)?
    };
    println!("{json}");
    Ok(())
}

/// Drive the full render-analyze-coach pipeline the way a host would:
/// tick the confined executor in a loop and poll shared state, streaming
/// feedback to the terminal as it arrives.
fn run_coach(
    cli: &Cli,
    config: &Config,
    analysis_config: AnalysisConfig,
    input: &Path,
    buffer: AudioBuffer,
    query: String,
) -> Result<()> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY must be set to ask the mix coach")?;
    let client = OpenAiClient::new(
        api_key,
        cli.model.clone(),
        Duration::from_secs(config.remote.timeout_secs),
    )?;

    let track_name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Track")
        .to_string();

    let mut project = FileProject::new(std::env::temp_dir().join("mixsense-renders"));
    let track = project.add_file_track(track_name, input.to_path_buf(), buffer);

    let shared = Arc::new(SharedState::new());
    let mut executor = ConfinedExecutor::new(
        Box::new(project),
        shared.clone(),
        Arc::new(client),
        config.scheduler_settings(),
    );
    executor.set_analysis_defaults(analysis_config);

    executor.enqueue_render_workflow(
        BounceTarget::Track(track),
        BounceMode::FullTrack,
        RequestContext {
            track_type: cli.track_type.clone(),
            user_query: query,
            ..RequestContext::default()
        },
    )?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("|/-\\ "),
    );

    let mut printed = 0usize;
    let result = loop {
        executor.tick();
        spinner.set_message(shared.phase().label());
        spinner.tick();

        if let Some(stream) = shared.streaming() {
            if stream.text_buffer.len() > printed {
                let chunk = stream.text_buffer[printed..].to_string();
                printed = stream.text_buffer.len();
                spinner.suspend(|| {
                    print!("{chunk}");
                    let _ = std::io::stdout().flush();
                });
            }
        }

        if let Some(result) = shared.result() {
            break result;
        }
        std::thread::sleep(Duration::from_millis(33));
    };

    // A few extra ticks so the worker's queued cleanup restores the track.
    for _ in 0..10 {
        executor.tick();
        std::thread::sleep(Duration::from_millis(10));
    }
    spinner.finish_and_clear();
    shared.clear_streaming();
    shared.clear_result();

    if !result.success {
        anyhow::bail!("Mix coach failed: {}", result.report_text);
    }

    // Flush whatever the stream drain missed.
    if result.report_text.len() > printed {
        print!("{}", &result.report_text[printed..]);
    }
    println!();
    log::info!("Done");
    Ok(())
}
