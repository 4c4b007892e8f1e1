//! Spectral-to-color processing pipeline
//!
//! Narrow-band exposures captured through a filter wheel under one or more
//! light sources are calibrated (bias and flat field), normalized against a
//! reference-white patch, registered band to band, integrated against the
//! color-matching functions into CIE XYZ, fused across lights, and rendered
//! as Lab or display RGB.

pub mod archive;
pub mod calibration;
pub mod common;
pub mod convert;
pub mod engine;
pub mod filter;
pub mod fusion;
pub mod image;
pub mod normalize;
pub mod source;
pub mod spectral;

pub use common::{ColorError, GuardStats, Rect, Result, StageTimings};

pub use image::{
    CalibratedImage, FlatFieldImage, LabImage, MultiPlaneImage, RawFrame, RgbImage, Sample,
    XyzImage,
};

pub use filter::{CmfTable, FilterConfiguration, FilterLayout, FilterPreset, IlluminantTable};

pub use calibration::{calibrate, CalibrationSet};

pub use spectral::{integrate, XyzAccumulator};

pub use normalize::{
    normalize_to_white, phase_correlate, register_image, register_plane, RegistrationOptions,
    RegistrationTargets,
};

pub use fusion::{fuse, fuse_resized, uniform_weights, weights_from_levels};

pub use convert::{xyz_to_lab, xyz_to_lab_cropped, xyz_to_srgb, xyz_to_srgb_cropped};

pub use archive::{write_rgb_tiff, ArchiveCompression, TiffArchiveWriter};

pub use source::{FrameReader, RawLoaderReader, TiffFrameReader};

pub use engine::{ColorEngine, EngineConfig, EngineReport};
