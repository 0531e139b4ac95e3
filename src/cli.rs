use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mixsense", about = "Offline mix analysis with streamed coaching feedback")]
pub struct Cli {
    /// Input audio file (WAV, FLAC)
    pub input: Option<PathBuf>,

    /// Ask the remote coach a question about the mix (requires OPENAI_API_KEY)
    #[arg(short, long)]
    pub ask: Option<String>,

    /// Print the raw analysis report as compact JSON instead of pretty
    #[arg(long)]
    pub compact: bool,

    /// What kind of material this is (drums, bass, vocals, master, ...)
    #[arg(long, default_value = "other")]
    pub track_type: String,

    /// FFT window size for the spectrum analysis
    #[arg(long, default_value_t = 4096)]
    pub window_size: usize,

    /// Cap on analyzed audio length in seconds
    #[arg(long, default_value_t = 30.0)]
    pub max_seconds: f32,

    /// Remote model name
    #[arg(long, default_value = "gpt-4.1")]
    pub model: String,

    /// Config file path (default: mixsense.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
