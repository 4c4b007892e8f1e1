//! Common utilities module
//!
//! This module contains shared utilities used across the color pipeline.

pub mod error;
pub mod rect;
pub mod timing;
pub mod guard;

pub use error::{ColorError, Result};
pub use rect::Rect;
pub use timing::{StageTimings, StepTiming, Timer};
pub use guard::GuardStats;
