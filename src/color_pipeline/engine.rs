//! Threaded color engine
//!
//! One background worker per engine consumes a blocking frame queue and
//! drives calibration, white-point normalization, registration and spectral
//! integration frame by frame.

mod color_engine;
pub mod config;
mod queue;
mod report;

#[cfg(test)]
mod tests;

pub use color_engine::ColorEngine;
pub use config::{EngineConfig, EngineConfigBuilder, DEFAULT_REFERENCE_WHITE};
pub use queue::FrameQueue;
pub use report::{EngineReport, FrameRegistration, FrameWhite};
