//! Private TIFF tags carried by archive pages

use tiff::tags::Tag;
use tracing::debug;

/// Capture-level and per-page tags in the private range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveTag {
    XBinning,
    YBinning,
    FilterCount,
    LightCount,
    Illuminant,
    WhitePointX,
    WhitePointY,
    ReferenceWhite,
    MeasuredWhite,
    Wavelength,
    LightIndex,
}

impl ArchiveTag {
    pub const ALL: [ArchiveTag; 11] = [
        ArchiveTag::XBinning,
        ArchiveTag::YBinning,
        ArchiveTag::FilterCount,
        ArchiveTag::LightCount,
        ArchiveTag::Illuminant,
        ArchiveTag::WhitePointX,
        ArchiveTag::WhitePointY,
        ArchiveTag::ReferenceWhite,
        ArchiveTag::MeasuredWhite,
        ArchiveTag::Wavelength,
        ArchiveTag::LightIndex,
    ];

    pub fn code(self) -> u16 {
        match self {
            ArchiveTag::XBinning => 40010,
            ArchiveTag::YBinning => 40011,
            ArchiveTag::FilterCount => 40012,
            ArchiveTag::LightCount => 40013,
            ArchiveTag::Illuminant => 40014,
            ArchiveTag::WhitePointX => 40015,
            ArchiveTag::WhitePointY => 40016,
            ArchiveTag::ReferenceWhite => 40019,
            ArchiveTag::MeasuredWhite => 40020,
            ArchiveTag::Wavelength => 40021,
            ArchiveTag::LightIndex => 40022,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveTag::XBinning => "XBINNING",
            ArchiveTag::YBinning => "YBINNING",
            ArchiveTag::FilterCount => "NFILTERS",
            ArchiveTag::LightCount => "NLIGHTS",
            ArchiveTag::Illuminant => "ILLUMINANT",
            ArchiveTag::WhitePointX => "WTPTX",
            ArchiveTag::WhitePointY => "WTPTY",
            ArchiveTag::ReferenceWhite => "WTPTVAL",
            ArchiveTag::MeasuredWhite => "WTPTMEASURED",
            ArchiveTag::Wavelength => "WAVELENGTH",
            ArchiveTag::LightIndex => "LIGHTINDEX",
        }
    }

    pub fn tag(self) -> Tag {
        Tag::Unknown(self.code())
    }
}

/// Record of which private tags a writer handle may emit.
///
/// Each archive writer owns one; registration happens once per handle.
#[derive(Debug, Default, Clone)]
pub struct CustomTagRegistry {
    registered: Vec<ArchiveTag>,
}

impl CustomTagRegistry {
    pub fn is_registered(&self) -> bool {
        !self.registered.is_empty()
    }

    pub fn contains(&self, tag: ArchiveTag) -> bool {
        self.registered.contains(&tag)
    }

    pub fn tags(&self) -> &[ArchiveTag] {
        &self.registered
    }
}

/// Registers every [`ArchiveTag`] on `registry`. Calling it again is a no-op.
/// Returns whether this call did the registration.
pub fn register_custom_tags(registry: &mut CustomTagRegistry) -> bool {
    if registry.is_registered() {
        return false;
    }
    registry.registered.extend(ArchiveTag::ALL);
    debug!(count = ArchiveTag::ALL.len(), "Archive tags registered");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = CustomTagRegistry::default();
        assert!(!registry.contains(ArchiveTag::ReferenceWhite));
        assert!(register_custom_tags(&mut registry));
        assert!(!register_custom_tags(&mut registry));
        assert_eq!(registry.tags().len(), ArchiveTag::ALL.len());
        assert!(registry.contains(ArchiveTag::MeasuredWhite));
    }

    #[test]
    fn test_codes_are_private_and_unique() {
        let mut codes: Vec<u16> = ArchiveTag::ALL.iter().map(|t| t.code()).collect();
        assert!(codes.iter().all(|&c| c >= 32768));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ArchiveTag::ALL.len());
        assert_eq!(ArchiveTag::ReferenceWhite.code(), 40019);
        assert_eq!(ArchiveTag::MeasuredWhite.name(), "WTPTMEASURED");
    }
}
