use crate::color_pipeline::common::{GuardStats, StageTimings};
use crate::color_pipeline::normalize::Registration;

/// White measurement for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWhite {
    pub band: usize,
    pub light: usize,
    pub wavelength: u32,
    pub reference: f32,
    /// `None` when no reference-white rectangle was configured.
    pub measured: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRegistration {
    pub band: usize,
    pub light: usize,
    pub registration: Registration,
}

/// What one worker run did.
#[derive(Debug, Clone, Default)]
pub struct EngineReport {
    pub frames_processed: usize,
    /// Real frames still queued when the run was joined, then dropped.
    pub frames_discarded: usize,
    pub cancelled: bool,
    pub poison_received: bool,
    pub guard: GuardStats,
    pub timings: StageTimings,
    pub whites: Vec<FrameWhite>,
    pub registrations: Vec<FrameRegistration>,
}

impl EngineReport {
    /// True when every expected frame was integrated and a master image built.
    pub fn completed(&self) -> bool {
        !self.cancelled
    }
}
