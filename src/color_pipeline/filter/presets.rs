//! Hardware filter-wheel layouts

use serde::{Deserialize, Serialize};

/// Ordered filter slots: wavelength, wheel position and focuser position per slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterLayout {
    pub wavelengths: Vec<u32>,
    pub hardware_positions: Vec<u32>,
    pub focus_positions: Vec<i64>,
    pub bandpass_width: Option<u32>,
}

impl FilterLayout {
    /// Layout with wheel positions counted from 1 and no focus data.
    pub fn from_wavelengths(wavelengths: Vec<u32>) -> Self {
        let hardware_positions = (1..=wavelengths.len() as u32).collect();
        Self {
            wavelengths,
            hardware_positions,
            focus_positions: Vec::new(),
            bandpass_width: None,
        }
    }
}

/// Filter wheels of the prototype cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPreset {
    /// 15 bandpass filters, 410-690 nm in 20 nm steps, ordered by focus offset
    Apr2014,
    /// 13 bandpass filters, 400-700 nm in 25 nm steps
    May2014,
}

impl FilterPreset {
    pub fn layout(&self) -> FilterLayout {
        match self {
            FilterPreset::Apr2014 => FilterLayout {
                // slot order minimizes focuser slew between consecutive filters
                wavelengths: vec![
                    570, 490, 610, 690, 550, 530, 670, 470, 510, 590, 630, 650, 430, 450, 410,
                ],
                hardware_positions: (2..=16).collect(),
                focus_positions: vec![
                    63000, 64000, 65000, 65000, 65500, 66000, 66000, 68000, 68000, 68000, 68000,
                    68000, 70000, 70000, 72000,
                ],
                bandpass_width: Some(3),
            },
            FilterPreset::May2014 => FilterLayout {
                wavelengths: (0..13).map(|i| 400 + i * 25).collect(),
                hardware_positions: (1..=13).collect(),
                focus_positions: vec![
                    52500, 49500, 56000, 47500, 47000, 47000, 47500, 48000, 48000, 48500, 48000,
                    50000, 50000,
                ],
                bandpass_width: None,
            },
        }
    }
}
