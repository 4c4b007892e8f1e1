//! Tabular CMF and illuminant ingestion
//!
//! Both tables are comma separated, one row per wavelength. Blank lines and
//! `#` comments are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use crate::color_pipeline::common::error::{ColorError, Result};

/// Measured illuminant values are stored in percent.
const ILLUMINANT_PERCENT_SCALE: f32 = 100.0;

/// Color-matching triples keyed by wavelength in nm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CmfTable {
    entries: BTreeMap<u32, [f32; 3]>,
}

impl CmfTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, wavelength: u32, xyz: [f32; 3]) {
        self.entries.insert(wavelength, xyz);
    }

    pub fn get(&self, wavelength: u32) -> Option<[f32; 3]> {
        self.entries.get(&wavelength).copied()
    }

    pub fn wavelengths(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses `wavelength,X,Y,Z` rows.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for (line_no, fields) in rows(reader) {
            let fields = fields?;
            if fields.len() < 4 {
                return Err(ColorError::TableParse {
                    line: line_no,
                    reason: format!("expected 4 columns, found {}", fields.len()),
                });
            }
            let wavelength = parse_wavelength(&fields[0], line_no)?;
            let xyz = [
                parse_value(&fields[1], line_no)?,
                parse_value(&fields[2], line_no)?,
                parse_value(&fields[3], line_no)?,
            ];
            table.insert(wavelength, xyz);
        }
        debug!("Parsed CMF table with {} wavelengths", table.len());
        Ok(table)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(open(path.as_ref())?)
    }
}

impl FromIterator<(u32, [f32; 3])> for CmfTable {
    fn from_iter<I: IntoIterator<Item = (u32, [f32; 3])>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Illuminant spectral power, already divided by 100, ordered by wavelength.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IlluminantTable {
    entries: BTreeMap<u32, f32>,
}

impl IlluminantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value that is already on the ingested (divided) scale.
    pub fn insert(&mut self, wavelength: u32, value: f32) {
        self.entries.insert(wavelength, value);
    }

    pub fn get(&self, wavelength: u32) -> Option<f32> {
        self.entries.get(&wavelength).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses `wavelength,value` rows, dividing each value by 100.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for (line_no, fields) in rows(reader) {
            let fields = fields?;
            if fields.len() < 2 {
                return Err(ColorError::TableParse {
                    line: line_no,
                    reason: format!("expected 2 columns, found {}", fields.len()),
                });
            }
            let wavelength = parse_wavelength(&fields[0], line_no)?;
            let value = parse_value(&fields[1], line_no)?;
            table.insert(wavelength, value / ILLUMINANT_PERCENT_SCALE);
        }
        debug!("Parsed illuminant table with {} wavelengths", table.len());
        Ok(table)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(open(path.as_ref())?)
    }

    /// Linearly interpolates between the two measured samples bracketing
    /// `wavelength`. Returns `None` outside the measured range.
    pub fn interpolate(&self, wavelength: u32) -> Option<f32> {
        if let Some(value) = self.get(wavelength) {
            return Some(value);
        }
        let (&w0, &x0) = self.entries.range(..wavelength).next_back()?;
        let (&w1, &x1) = self.entries.range(wavelength..).next()?;
        let t = (wavelength - w0) as f32 / (w1 - w0) as f32;
        Some(x0 + (x1 - x0) * t)
    }

    /// Fills every wavelength in `targets` that has no measured sample,
    /// leaving out-of-range wavelengths absent.
    pub fn resample_to(&self, targets: impl IntoIterator<Item = u32>) -> Self {
        let mut out = self.clone();
        for wavelength in targets {
            if out.get(wavelength).is_none() {
                if let Some(value) = self.interpolate(wavelength) {
                    out.insert(wavelength, value);
                }
            }
        }
        out
    }
}

impl FromIterator<(u32, f32)> for IlluminantTable {
    fn from_iter<I: IntoIterator<Item = (u32, f32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn open(path: &Path) -> Result<std::io::BufReader<std::fs::File>> {
    let file = std::fs::File::open(path)
        .map_err(|e| ColorError::InputReadError(format!("{}: {}", path.display(), e)))?;
    Ok(std::io::BufReader::new(file))
}

/// Yields `(1-based line number, trimmed fields)` for every data row.
fn rows<R: BufRead>(reader: R) -> impl Iterator<Item = (usize, Result<Vec<String>>)> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line_no = index + 1;
            match line {
                Err(e) => Some((line_no, Err(ColorError::from(e)))),
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        None
                    } else {
                        let fields = trimmed.split(',').map(|f| f.trim().to_string()).collect();
                        Some((line_no, Ok(fields)))
                    }
                }
            }
        })
}

fn parse_wavelength(field: &str, line: usize) -> Result<u32> {
    field.parse::<u32>().map_err(|e| ColorError::TableParse {
        line,
        reason: format!("bad wavelength {:?}: {}", field, e),
    })
}

fn parse_value(field: &str, line: usize) -> Result<f32> {
    field.parse::<f32>().map_err(|e| ColorError::TableParse {
        line,
        reason: format!("bad value {:?}: {}", field, e),
    })
}
