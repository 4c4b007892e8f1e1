//! White-point normalization and geometric registration
//!
//! Photometric normalization rescales each plane so the median of a
//! reference-white patch lands on a known value. Registration aligns one band
//! to another with two phase-correlated targets (uniform scale about the image
//! center plus translation; rotation is not modeled).

mod phase_correlation;
mod registration;
mod warp;
mod white_point;

pub use phase_correlation::{phase_correlate, PhaseOffset};
pub use registration::{
    estimate_scale, register_image, register_plane, Registration, RegistrationOptions,
    RegistrationTargets,
};
pub use warp::{warp_plane, SimilarityTransform};
pub use white_point::{
    median_blur_3x3, median_in_rect, measure_white, normalize_plane, normalize_to_peak,
    normalize_to_white, normalize_with_measured, NormalizationReport,
};
