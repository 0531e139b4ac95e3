//! mixsense - offline render-analyze-coach pipeline for DAW audio.
//!
//! The host application drives everything from a single confined thread: it
//! calls [`ConfinedExecutor::tick`] once per frame, enqueues workflows, and
//! polls [`SharedState`] for phase, streamed text and the final result.
//! CPU-bound analysis and the blocking network call run on detached worker
//! threads that never touch host objects.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod host;
pub mod pipeline;
pub mod remote;

pub use analysis::engine::{analyze, AnalysisConfig, AnalysisResult};
pub use audio::buffer::AudioBuffer;
pub use pipeline::scheduler::{BounceMode, BounceTarget, ConfinedExecutor};
pub use pipeline::state::{AnalysisPhase, SharedState};
