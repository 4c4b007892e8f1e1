//! Filter-wheel and spectral weight configuration
//!
//! This module holds the immutable wavelength table shared by every stage:
//! color-matching triples, illuminant scalars, and hardware layout.

mod config;
pub mod presets;
pub mod tables;

pub use config::{FilterConfiguration, FilterConfigurationBuilder, SpectralWeights};
pub use presets::{FilterLayout, FilterPreset};
pub use tables::{CmfTable, IlluminantTable};
