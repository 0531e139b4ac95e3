use serde::Deserialize;
use std::path::PathBuf;

use crate::analysis::engine::AnalysisConfig;
use crate::pipeline::scheduler::SchedulerSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub remote: RemoteSection,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisSection {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f32,
    #[serde(default = "default_fresh_decode")]
    pub fresh_decode: bool,
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_stable_reads")]
    pub stable_reads: u32,
    #[serde(default = "default_defer_budget")]
    pub defer_budget: u32,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            max_seconds: default_max_seconds(),
            fresh_decode: default_fresh_decode(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            stable_reads: default_stable_reads(),
            defer_budget: default_defer_budget(),
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_window_size() -> usize { 4096 }
fn default_max_seconds() -> f32 { 30.0 }
fn default_fresh_decode() -> bool { true }
fn default_stable_reads() -> u32 { 3 }
fn default_defer_budget() -> u32 { 100 }
fn default_model() -> String { "gpt-4.1".into() }
fn default_timeout_secs() -> u64 { 300 }

impl Config {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            window_size: self.analysis.window_size,
            max_seconds: self.analysis.max_seconds,
            fresh_decode: self.analysis.fresh_decode,
            ..AnalysisConfig::default()
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            stable_reads: self.scheduler.stable_reads,
            defer_budget: self.scheduler.defer_budget,
        }
    }
}

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_constants() {
        let config = Config::default();
        assert_eq!(config.scheduler.stable_reads, 3);
        assert_eq!(config.scheduler.defer_budget, 100);
        assert_eq!(config.analysis.window_size, 4096);
        assert_eq!(config.analysis.max_seconds, 30.0);
        assert_eq!(config.remote.model, "gpt-4.1");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            defer_budget = 50

            [remote]
            model = "gpt-4o-mini"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.scheduler.defer_budget, 50);
        assert_eq!(config.scheduler.stable_reads, 3);
        assert_eq!(config.remote.model, "gpt-4o-mini");
        assert_eq!(config.remote.timeout_secs, 300);
        assert_eq!(config.analysis.window_size, 4096);
    }
}
